// src/digest.rs -- thin wrapper for digest computations
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

//! Helpers to tidy up the computation of SHA-256 digests in the various
//! places that need them: cache bodies, bundle identities, format-cache keys.

pub use sha2::{Digest, Sha256 as DigestComputer};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{Error, ErrorKind, Result};

// Generic helpers

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .concat()
}

pub fn hex_to_bytes(text: &str, dest: &mut [u8]) -> Result<()> {
    let n = dest.len();
    let text_len = text.len();

    if text_len != 2 * n {
        return Err(ErrorKind::BadLength(2 * n, text_len).into());
    }

    for i in 0..n {
        dest[i] = u8::from_str_radix(&text[i * 2..(i + 1) * 2], 16)?;
    }

    Ok(())
}

// The specific implementation we're using: SHA256.

const N_BYTES: usize = 32;
pub const DIGEST_LEN: usize = 64;

pub fn create() -> DigestComputer {
    Default::default()
}

/// Digest of a byte slice, in one shot.
pub fn of_bytes(bytes: &[u8]) -> DigestData {
    let mut dc = create();
    dc.update(bytes);
    DigestData::from(dc)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DigestData([u8; N_BYTES]);

impl DigestData {
    pub fn zeros() -> DigestData {
        DigestData([0u8; N_BYTES])
    }

    pub fn of_nothing() -> DigestData {
        let dc = create();
        Self::from(dc)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Render the first `n` hex digits of this digest. Used for
    /// cache-generation stamps, which only need a prefix of the identity.
    pub fn hex_prefix(&self, n: usize) -> String {
        let mut s = bytes_to_hex(&self.0);
        s.truncate(n);
        s
    }

    /// Given a base path, create a child path from this digest's value. The
    /// child path has a subdirectory named from the first two hex digits of
    /// the digest, then a name consisting of the rest of the hex data. **The
    /// two-digit subdirectory and all parent directories are created when
    /// you call this function!**
    pub fn create_two_part_path(&self, base: &Path) -> Result<PathBuf> {
        let mut p = base.to_path_buf();
        p.push(format!("{:02x}", self.0[0]));
        fs::create_dir_all(&p)?;
        p.push(bytes_to_hex(&self.0[1..]));
        Ok(p)
    }

    /// The same two-segment path, without touching the filesystem.
    pub fn two_part_path(&self, base: &Path) -> PathBuf {
        let mut p = base.to_path_buf();
        p.push(format!("{:02x}", self.0[0]));
        p.push(bytes_to_hex(&self.0[1..]));
        p
    }
}

impl std::fmt::Display for DigestData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", bytes_to_hex(&self.0))
    }
}

impl FromStr for DigestData {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut result = DigestData::zeros();
        hex_to_bytes(s, &mut result.0)?;
        Ok(result)
    }
}

impl From<DigestComputer> for DigestData {
    fn from(s: DigestComputer) -> DigestData {
        let mut result = DigestData::zeros();
        let res = s.finalize();
        result.0.copy_from_slice(res.as_slice());
        result
    }
}
