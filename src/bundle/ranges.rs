// src/bundle/ranges.rs -- merged-range planning for cooperative batch fetches
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! The browser worker cannot spin up a thread pool, so its batch fetches
//! are planned instead: entries are sorted by offset and adjacent ones are
//! coalesced into merged ranges, each satisfied by one request whose
//! response is sliced back into the individual files. When a merged
//! request fails it decomposes into its entries for individual retries.

use crate::errors::{ErrorKind, Result};
use crate::itar::IndexEntry;

/// Two entries are merged when the gap between them is at most this.
pub const MAX_GAP: u64 = 64 * 1024;

/// A merged range never grows beyond this many bytes.
pub const MAX_RANGE_SIZE: u64 = 2 * 1024 * 1024;

/// How many merged requests run concurrently.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Concurrency while retrying previously failed entries.
pub const RETRY_CONCURRENCY: usize = 2;

/// Backoff schedule for per-entry retries, in seconds.
pub const RETRY_BACKOFF_SECS: &[u64] = &[1, 2];

/// One name with its resolved index entry, in a fetch plan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanEntry {
    pub name: String,
    pub entry: IndexEntry,
}

/// A single HTTP request covering one or more plan entries.
#[derive(Clone, Debug)]
pub struct MergedRange {
    pub offset: u64,
    pub length: u64,
    pub parts: Vec<PlanEntry>,
}

impl MergedRange {
    fn from_entry(e: PlanEntry) -> MergedRange {
        MergedRange {
            offset: e.entry.offset,
            length: u64::from(e.entry.length),
            parts: vec![e],
        }
    }

    fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Whether `e` can be absorbed without exceeding the gap and size caps.
    fn accepts(&self, e: &PlanEntry, max_gap: u64, max_size: u64) -> bool {
        let start = e.entry.offset;
        let end = start + u64::from(e.entry.length);

        start >= self.offset
            && start.saturating_sub(self.end()) <= max_gap
            && end.saturating_sub(self.offset) <= max_size
    }

    fn absorb(&mut self, e: PlanEntry) {
        let end = e.entry.offset + u64::from(e.entry.length);
        self.length = self.length.max(end - self.offset);
        self.parts.push(e);
    }

    /// Undo the merge: the individual entries, for retry at lower
    /// concurrency.
    pub fn decompose(&self) -> Vec<PlanEntry> {
        self.parts.clone()
    }

    /// Slice a merged response body back into per-file buffers, in the
    /// order the files appear in the merged range. Each slice is byte-wise
    /// identical to an individual fetch of the same entry.
    pub fn split(&self, body: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
        if body.len() as u64 != self.length {
            return Err(ErrorKind::BadLength(self.length as usize, body.len()).into());
        }

        let mut out = Vec::with_capacity(self.parts.len());

        for part in &self.parts {
            let start = (part.entry.offset - self.offset) as usize;
            let end = start + part.entry.length as usize;
            out.push((part.name.clone(), body[start..end].to_vec()));
        }

        Ok(out)
    }
}

/// Sort entries by offset and coalesce neighbors. Entries are never
/// reordered within a merged range, so `split` slices them in offset
/// order.
pub fn coalesce(mut entries: Vec<PlanEntry>, max_gap: u64, max_size: u64) -> Vec<MergedRange> {
    entries.sort_by_key(|e| e.entry.offset);

    let mut merged: Vec<MergedRange> = Vec::new();

    for e in entries {
        match merged.last_mut() {
            Some(last) if last.accepts(&e, max_gap, max_size) => last.absorb(e),
            _ => merged.push(MergedRange::from_entry(e)),
        }
    }

    merged
}

/// Plan with the worker's default tuning.
pub fn plan(entries: Vec<PlanEntry>) -> Vec<MergedRange> {
    coalesce(entries, MAX_GAP, MAX_RANGE_SIZE)
}
