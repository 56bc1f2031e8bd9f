// src/host/mod.rs -- the platform boundary under the bundle machinery
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! One narrow interface separates bundle logic from the platform it runs
//! on. The native side maps it onto blocking HTTP plus a filesystem cache;
//! the browser side maps it onto synchronous XHR plus the origin-private
//! filesystem. Nothing lands in this trait that one of the two cannot
//! support.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::errors::Result;
use crate::itar::IndexEntry;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(target_arch = "wasm32")]
pub mod browser;

/// The result of trying to open a named resource. It is worth
/// distinguishing between unavailability of a given name and an error
/// accessing it: the engine routinely probes for files that do not exist.
#[derive(Debug)]
pub enum OpenResult<T> {
    Ok(T),
    NotAvailable,
    Err(crate::errors::Error),
}

impl<T> OpenResult<T> {
    pub fn is_not_available(&self) -> bool {
        matches!(self, OpenResult::NotAvailable)
    }

    /// Convert into a plain `Result`, treating unavailability as an error.
    pub fn must_exist(self, name: &str) -> Result<T> {
        match self {
            OpenResult::Ok(t) => Ok(t),
            OpenResult::Err(e) => Err(e),
            OpenResult::NotAvailable => {
                Err(crate::errors::ErrorKind::NotFound(name.to_owned()).into())
            }
        }
    }
}

/// Outcome of a fast persistent-cache membership probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheCheck {
    Hit,
    Miss,
    /// The host has no persistent cache to ask (e.g. OPFS unavailable).
    Unsupported,
}

/// A re-readable byte source handed up from a host. The native cache hands
/// out real files; the browser host hands out owned buffers.
pub enum InputSource {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl InputSource {
    pub fn from_bytes(bytes: Vec<u8>) -> InputSource {
        InputSource::Memory(Cursor::new(bytes))
    }
}

impl Read for InputSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            InputSource::File(f) => f.read(buf),
            InputSource::Memory(c) => c.read(buf),
        }
    }
}

impl Seek for InputSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            InputSource::File(f) => f.seek(pos),
            InputSource::Memory(c) => c.seek(pos),
        }
    }
}

/// One name to be pre-fetched by a batch seed, already resolved against the
/// index.
#[derive(Clone, Debug)]
pub struct SeedItem {
    pub name: String,
    pub entry: IndexEntry,
}

/// What a batch seed accomplished. Per-item ordering is not guaranteed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub fetched: usize,
    pub failed: Vec<String>,
}

/// The hot-path HTTP timeout: a 20 second floor plus one second for every
/// 100 kB requested.
pub fn fetch_timeout_secs(length: u32) -> u64 {
    20 + (u64::from(length) + 99_999) / 100_000
}

/// Timeout for the one-shot index download.
pub const INDEX_FETCH_TIMEOUT_SECS: u64 = 30;

pub trait Host {
    /// Perform the byte-range request for one bundle entry and return the
    /// body. The payload must be exactly `entry.length` bytes.
    fn fetch_range(&mut self, name: &str, entry: IndexEntry) -> Result<Vec<u8>>;

    /// Fetch the bundle index, already decompressed.
    fn fetch_index(&mut self) -> Result<Vec<u8>>;

    /// Read the persisted index text for the configured bundle, if any.
    fn load_cached_index(&mut self) -> Option<Vec<u8>>;

    /// Persist decompressed index text. May be a no-op where persistence
    /// is impossible.
    fn cache_index(&mut self, content: &[u8]) -> Result<()>;

    /// Fast membership probe against the persistent cache.
    fn cache_check(&mut self, name: &str) -> CacheCheck;

    /// Open a cached body for reading.
    fn cache_open(&mut self, name: &str) -> Option<InputSource>;

    /// Record a fetched body in the persistent cache. Durable before
    /// returning on native; fire-and-forget in the browser.
    fn cache_write(&mut self, name: &str, content: &[u8]) -> Result<()>;

    /// Flush any in-memory cache bookkeeping.
    fn cache_save(&mut self);

    /// Fetch many entries at once, in parallel where the platform allows.
    /// Not part of the browser host's surface; the worker's cooperative
    /// planner covers that side.
    #[cfg(not(target_arch = "wasm32"))]
    fn batch_seed(&mut self, items: &[SeedItem], concurrency: usize) -> BatchOutcome;

    /// Monotonic-enough wall time in nanoseconds, for elapsed reporting.
    fn timestamp_ns(&self) -> i128;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_scales_with_length() {
        assert_eq!(fetch_timeout_secs(0), 20);
        assert_eq!(fetch_timeout_secs(1), 21);
        assert_eq!(fetch_timeout_secs(100_000), 21);
        assert_eq!(fetch_timeout_secs(100_001), 22);
        assert_eq!(fetch_timeout_secs(1_000_000), 30);
    }
}
