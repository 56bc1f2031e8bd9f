// src/format_cache.rs -- content-addressed store of precompiled format files
// Copyright 2018-2020 the Tectonic Project
// Licensed under the MIT License.

//! Format files are large binary preloads that the engine slurps at startup
//! to skip macro initialization. Generating one is a first-run expense, so
//! the result is cached on disk, keyed by everything its contents depend on:
//! the bundle identity, the engine's format-serial version, and which format
//! was dumped. The blobs themselves are opaque here.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::digest::{self, Digest, DigestData};
use crate::errors::{Error, Result};

/// Which macro package the format preloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatKind {
    Latex,
    Plain,
}

impl FormatKind {
    /// The canonical on-disk name of this format's dump.
    pub fn dump_name(self) -> &'static str {
        match self {
            FormatKind::Latex => "xelatex",
            FormatKind::Plain => "plain",
        }
    }

    pub fn dump_file_name(self) -> String {
        format!("{}.fmt", self.dump_name())
    }

    /// The one-line TeX stub fed to the engine in initex mode to produce
    /// this format.
    pub fn initex_stub(self) -> &'static str {
        match self {
            FormatKind::Latex => "\\input tectonic-format-latex.tex\n",
            FormatKind::Plain => "\\input plain \\dump\n",
        }
    }

    fn key_tag(self) -> u8 {
        match self {
            FormatKind::Latex => 0,
            FormatKind::Plain => 1,
        }
    }
}

impl FromStr for FormatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latex" | "xelatex" => Ok(FormatKind::Latex),
            "plain" => Ok(FormatKind::Plain),
            other => Err(crate::errmsg!("unknown format \"{}\"", other)),
        }
    }
}

/// Compute the cache key for a format: the SHA-256 of the bundle digest,
/// the engine version as big-endian `u32`, and the format tag byte. The key
/// is deterministic and stable across runs.
pub fn format_cache_key(
    bundle_digest: &DigestData,
    engine_version: u32,
    kind: FormatKind,
) -> DigestData {
    let mut dc = digest::create();
    dc.update(bundle_digest.as_bytes());
    dc.update(&engine_version.to_be_bytes());
    dc.update(&[kind.key_tag()]);
    DigestData::from(dc)
}

pub struct FormatCache {
    formats_dir: PathBuf,
}

impl FormatCache {
    pub fn new(formats_dir: PathBuf) -> FormatCache {
        FormatCache { formats_dir }
    }

    fn path_for(&self, key: &DigestData) -> PathBuf {
        self.formats_dir.join(format!("{}.fmt", key))
    }

    /// Fetch a cached format blob. Any failure at all (missing file, read
    /// error, empty file) is a miss.
    pub fn load(&self, key: &DigestData) -> Option<Vec<u8>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// Store a blob atomically: write to a sibling temp file, then rename
    /// into place.
    pub fn store(&self, key: &DigestData, data: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.formats_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.formats_dir)?;
        tmp.write_all(data)?;
        tmp.persist(self.path_for(key))
            .map_err(|e| Error::from(e.error))?;
        Ok(())
    }

    pub fn invalidate(&self, key: &DigestData) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Convenience for tests and the driver: a cache rooted below an arbitrary
/// base directory.
pub fn format_cache_in(base: &Path) -> FormatCache {
    FormatCache::new(base.join("formats"))
}
