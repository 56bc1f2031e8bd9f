// src/cache.rs -- the persistent, content-addressed local file cache
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

//! The on-disk cache of bundle files. Bodies are stored once, addressed by
//! the SHA-256 of their contents; a per-bundle manifest maps names onto
//! those bodies, so several names can share one body and switching bundles
//! only ever invalidates manifests.
//!
//! Layout under the cache root:
//!
//! ```text
//! files/<hh>/<rest-of-64-hex-digits>   body, content-addressed
//! manifests/<bundle_digest>.txt        lines of "<name> <size> <hex-hash>"
//! indexes/<bundle_digest>.txt          decompressed index text
//! formats/<64-hex>.fmt                 format blobs (see format_cache)
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::digest::{self, DigestData};
use crate::errors::{ErrorKind, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub digest: DigestData,
    pub size: u32,
}

pub struct LocalCache {
    root: PathBuf,
    manifest_path: PathBuf,
    contents: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl LocalCache {
    /// Open (or create) the cache under `root`, keyed by the bundle digest.
    /// A corrupt manifest line is skipped rather than poisoning the cache.
    pub fn open(root: &Path, bundle_digest: &DigestData) -> Result<LocalCache> {
        for sub in &["files", "manifests", "indexes", "formats"] {
            fs::create_dir_all(root.join(sub))?;
        }

        let manifest_path = root
            .join("manifests")
            .join(format!("{}.txt", bundle_digest));

        let mut contents = HashMap::new();

        if let Ok(text) = fs::read_to_string(&manifest_path) {
            for line in text.lines() {
                let mut fields = line.split_whitespace();

                let name = match fields.next() {
                    Some(n) => n,
                    None => continue,
                };
                let size = match fields.next().and_then(|f| f.parse::<u32>().ok()) {
                    Some(s) => s,
                    None => continue,
                };
                let hash = match fields.next().and_then(|f| DigestData::from_str(f).ok()) {
                    Some(h) => h,
                    None => continue,
                };

                contents.insert(name.to_owned(), CacheEntry { digest: hash, size });
            }
        }

        Ok(LocalCache {
            root: root.to_owned(),
            manifest_path,
            contents,
            dirty: false,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<CacheEntry> {
        self.contents.get(name).copied()
    }

    /// Open a cached body for reading. `None` when the name is unknown or
    /// the body has gone missing from under the manifest.
    pub fn open_file(&self, name: &str) -> Option<File> {
        let entry = self.contents.get(name)?;
        let path = entry.digest.two_part_path(&self.root.join("files"));
        File::open(path).ok()
    }

    /// Record `content` under `name`. The body write is durable before this
    /// returns; the manifest line is only recorded in memory once the body
    /// is safely down, so a failed write never leaves a dangling entry.
    pub fn write(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let hash = digest::of_bytes(content);

        let final_path = match hash.create_two_part_path(&self.root.join("files")) {
            Ok(p) => p,
            Err(_) => return Err(ErrorKind::CacheWriteFailed(name.to_owned()).into()),
        };

        // Identical bodies are shared; only write one that is new.
        if !final_path.exists() {
            let r = tempfile::NamedTempFile::new_in(&self.root)
                .and_then(|mut tmp| {
                    tmp.write_all(content)?;
                    tmp.flush()?;
                    Ok(tmp)
                })
                .map_err(crate::errors::Error::from)
                .and_then(|tmp| {
                    tmp.persist(&final_path)
                        .map_err(|e| crate::errors::Error::from(e.error))
                });

            if r.is_err() {
                return Err(ErrorKind::CacheWriteFailed(name.to_owned()).into());
            }
        }

        self.contents.insert(
            name.to_owned(),
            CacheEntry {
                digest: hash,
                size: content.len() as u32,
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Flush the in-memory manifest: rewrite it atomically in one pass.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut text = String::new();
        for (name, entry) in &self.contents {
            text.push_str(&format!("{} {} {}\n", name, entry.size, entry.digest));
        }

        let mut tmp = tempfile::NamedTempFile::new_in(self.manifest_path.parent().unwrap())?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&self.manifest_path)
            .map_err(|e| crate::errors::Error::from(e.error))?;

        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    // The decompressed-index side cache, keyed by the same bundle identity.

    pub fn load_index(&self, bundle_digest: &DigestData) -> Option<Vec<u8>> {
        let path = self
            .root
            .join("indexes")
            .join(format!("{}.txt", bundle_digest));
        match fs::read(path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    pub fn store_index(&self, bundle_digest: &DigestData, content: &[u8]) -> Result<()> {
        let path = self
            .root
            .join("indexes")
            .join(format!("{}.txt", bundle_digest));
        let mut tmp = tempfile::NamedTempFile::new_in(self.root.join("indexes"))?;
        tmp.write_all(content)?;
        tmp.persist(&path)
            .map_err(|e| crate::errors::Error::from(e.error))?;
        Ok(())
    }

    pub fn formats_dir(&self) -> PathBuf {
        self.root.join("formats")
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        // Callers should save() explicitly to see errors; this is the
        // last-chance flush on store teardown.
        let _ = self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn digest_for_tests() -> DigestData {
        DigestData::from_str(crate::config::DEFAULT_BUNDLE_DIGEST).unwrap()
    }

    #[test]
    fn write_then_open_round_trips() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();
        let mut cache = LocalCache::open(dir.path(), &d).unwrap();

        cache.write("plain.tex", b"\\dump\n").unwrap();

        let mut f = cache.open_file("plain.tex").unwrap();
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"\\dump\n");
    }

    #[test]
    fn manifest_survives_reload() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();

        {
            let mut cache = LocalCache::open(dir.path(), &d).unwrap();
            cache.write("latex.ltx", b"% latex base").unwrap();
            cache.save().unwrap();
        }

        let cache = LocalCache::open(dir.path(), &d).unwrap();
        assert!(cache.contains("latex.ltx"));
        let entry = cache.entry("latex.ltx").unwrap();
        assert_eq!(entry.size, b"% latex base".len() as u32);
        assert_eq!(entry.digest, digest::of_bytes(b"% latex base"));
    }

    #[test]
    fn identical_bodies_are_shared() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();
        let mut cache = LocalCache::open(dir.path(), &d).unwrap();

        cache.write("a.sty", b"same bytes").unwrap();
        cache.write("b.sty", b"same bytes").unwrap();

        assert_eq!(
            cache.entry("a.sty").unwrap().digest,
            cache.entry("b.sty").unwrap().digest
        );

        // exactly one body on disk
        let hash = digest::of_bytes(b"same bytes");
        let body = hash.two_part_path(&dir.path().join("files"));
        assert!(body.exists());

        let mut count = 0;
        for sub in fs::read_dir(dir.path().join("files")).unwrap() {
            for _ in fs::read_dir(sub.unwrap().path()).unwrap() {
                count += 1;
            }
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn zero_length_body_is_cacheable() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();
        let mut cache = LocalCache::open(dir.path(), &d).unwrap();

        cache.write("empty.def", b"").unwrap();
        assert_eq!(cache.entry("empty.def").unwrap().size, 0);
        assert_eq!(
            cache.entry("empty.def").unwrap().digest,
            DigestData::of_nothing()
        );

        let mut f = cache.open_file("empty.def").unwrap();
        let mut bytes = Vec::new();
        f.read_to_end(&mut bytes).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn corrupt_manifest_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();

        fs::create_dir_all(dir.path().join("manifests")).unwrap();
        let good_hash = digest::of_bytes(b"x");
        fs::write(
            dir.path().join("manifests").join(format!("{}.txt", d)),
            format!(
                "good.tex 1 {}\nbad-size.tex NaN {}\nbad-hash.tex 1 zzzz\nshort.tex\n",
                good_hash, good_hash
            ),
        )
        .unwrap();

        let cache = LocalCache::open(dir.path(), &d).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("good.tex"));
    }

    #[test]
    fn manifests_are_keyed_by_bundle_digest() {
        let dir = TempDir::new().unwrap();
        let d1 = digest_for_tests();
        let d2 = digest::of_bytes(b"a different bundle");

        {
            let mut cache = LocalCache::open(dir.path(), &d1).unwrap();
            cache.write("only-in-one.tex", b"hi").unwrap();
            cache.save().unwrap();
        }

        let other = LocalCache::open(dir.path(), &d2).unwrap();
        assert!(!other.contains("only-in-one.tex"));
    }

    #[test]
    fn index_side_cache_round_trips() {
        let dir = TempDir::new().unwrap();
        let d = digest_for_tests();
        let cache = LocalCache::open(dir.path(), &d).unwrap();

        assert!(cache.load_index(&d).is_none());
        cache.store_index(&d, b"a.tex 0 10\n").unwrap();
        assert_eq!(cache.load_index(&d).unwrap(), b"a.tex 0 10\n");
    }
}
