// src/bundle/mod.rs -- resolving names against the remote bundle
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

//! The resolution engine that feeds the TeX engine its support files:
//! cache, then index, then a byte-range fetch, then persistence, then an
//! open handle back to the caller. One store is created per compile and
//! torn down afterwards; the parsed index is built lazily on first need.

pub mod ranges;
pub mod seed;

use byte_unit::Byte;

use crate::errors::{ErrorKind, Result, ResultExt};
use crate::host::{CacheCheck, Host, InputSource, OpenResult, SeedItem};
use crate::itar::{BundleIndex, IndexEntry};
use crate::status::StatusBackend;
use crate::{tt_note, tt_warning};

/// What a seed pass did with the names it was handed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SeedReport {
    pub fetched: usize,
    pub skipped_cached: usize,
    pub skipped_unknown: usize,
    pub failed: usize,
}

pub struct BundleStore {
    host: Box<dyn Host>,
    index: BundleIndex,
    index_loaded: bool,
}

impl BundleStore {
    pub fn new(host: Box<dyn Host>) -> BundleStore {
        BundleStore {
            host,
            index: BundleIndex::new(),
            index_loaded: false,
        }
    }

    /// Make sure the index is loaded: first from the persistent index
    /// cache, then over the network, writing the decompressed text back to
    /// the cache on success. Errors only when neither source can supply it.
    pub fn ensure_index(&mut self, status: &mut dyn StatusBackend) -> Result<()> {
        if self.index_loaded {
            return Ok(());
        }

        if let Some(bytes) = self.host.load_cached_index() {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                self.index.load_from_text(text);
            }
        }

        if self.index.is_empty() {
            let bytes = match self.host.fetch_index() {
                Ok(b) => b,
                Err(e) => {
                    return Err(crate::errors::Error::with_chain(e, ErrorKind::IndexNotLoaded));
                }
            };

            let text = std::str::from_utf8(&bytes)
                .chain_err(|| "the bundle index is not valid UTF-8")?;
            self.index.load_from_text(text);

            if !self.index.is_empty() {
                if let Err(e) = self.host.cache_index(&bytes) {
                    tt_warning!(status, "failed to persist the bundle index"; e);
                }
            }

            tt_note!(status, "indexed {} bundle files", self.index.len());
        }

        self.index_loaded = true;
        Ok(())
    }

    /// Look a name up in the index, applying the index's prefix rule. The
    /// index is loaded on demand.
    pub fn resolve_index_entry(
        &mut self,
        name: &str,
        status: &mut dyn StatusBackend,
    ) -> Result<Option<IndexEntry>> {
        self.ensure_index(status)?;
        Ok(self.index.get(name))
    }

    /// Whether this store can produce the named file at all: either the
    /// persistent cache already has it, or the index knows it.
    pub fn has(&mut self, name: &str, status: &mut dyn StatusBackend) -> bool {
        if self.host.cache_check(name) == CacheCheck::Hit {
            return true;
        }

        match self.resolve_index_entry(name, status) {
            Ok(entry) => entry.is_some(),
            Err(_) => false,
        }
    }

    /// Number of entries in the loaded index. This intentionally does not
    /// count cached-but-unindexed files.
    pub fn count(&mut self, status: &mut dyn StatusBackend) -> Result<usize> {
        self.ensure_index(status)?;
        Ok(self.index.len())
    }

    /// The full resolution path: cache, index, fetch, persist, deliver.
    /// The returned source is positioned at byte zero.
    pub fn resolve(&mut self, name: &str, status: &mut dyn StatusBackend) -> OpenResult<InputSource> {
        if self.host.cache_check(name) == CacheCheck::Hit {
            if let Some(src) = self.host.cache_open(name) {
                return OpenResult::Ok(src);
            }
            // Manifest said hit but the body is gone; fall through and
            // treat it as a miss.
        }

        if let Err(e) = self.ensure_index(status) {
            return OpenResult::Err(e);
        }

        let entry = match self.index.get(name) {
            Some(e) => e,
            None => return OpenResult::NotAvailable,
        };

        let body = match self.host.fetch_range(name, entry) {
            Ok(b) => b,
            Err(e) => return OpenResult::Err(e),
        };

        if let Err(e) = self.host.cache_write(name, &body) {
            return OpenResult::Err(e);
        }

        // Re-open through the content-addressed cache so later reads of a
        // deduplicated body share the same backing file. If the re-open
        // fails even though the write succeeded, serve the bytes we
        // already have.
        match self.host.cache_open(name) {
            Some(src) => OpenResult::Ok(src),
            None => {
                tt_warning!(
                    status,
                    "cached copy of \"{}\" could not be re-opened; serving the fetched bytes",
                    name
                );
                OpenResult::Ok(InputSource::from_bytes(body))
            }
        }
    }

    /// Pre-fetch a list of names so the engine never stalls on them
    /// mid-pass. Unknown names and cache hits are skipped; the host picks
    /// the threading strategy. Completion order is not guaranteed.
    pub fn seed(
        &mut self,
        names: &[&str],
        concurrency: usize,
        status: &mut dyn StatusBackend,
    ) -> Result<SeedReport> {
        self.ensure_index(status)?;

        let mut report = SeedReport::default();
        let mut items = Vec::new();
        let mut total_bytes = 0u64;

        for name in names {
            if self.host.cache_check(name) == CacheCheck::Hit {
                report.skipped_cached += 1;
                continue;
            }

            match self.index.get(name) {
                Some(entry) => {
                    total_bytes += u64::from(entry.length);
                    items.push(SeedItem {
                        name: (*name).to_owned(),
                        entry,
                    });
                }
                None => report.skipped_unknown += 1,
            }
        }

        if items.is_empty() {
            return Ok(report);
        }

        tt_note!(
            status,
            "seeding {} bundle files ({})",
            items.len(),
            Byte::from_bytes(u128::from(total_bytes)).get_appropriate_unit(false)
        );

        #[cfg(not(target_arch = "wasm32"))]
        {
            let outcome = self.host.batch_seed(&items, concurrency);
            report.fetched = outcome.fetched;
            report.failed = outcome.failed.len();

            for name in &outcome.failed {
                tt_warning!(status, "failed to seed \"{}\"", name);
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            // No threads in the worker; fetch sequentially. The
            // cooperative merged-range path in the worker is preferred and
            // runs before compiles; this is the synchronous fallback.
            let _ = concurrency;

            for item in &items {
                match self.host.fetch_range(&item.name, item.entry) {
                    Ok(body) => match self.host.cache_write(&item.name, &body) {
                        Ok(()) => report.fetched += 1,
                        Err(_) => report.failed += 1,
                    },
                    Err(_) => {
                        tt_warning!(status, "failed to seed \"{}\"", item.name);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    pub fn timestamp_ns(&self) -> i128 {
        self.host.timestamp_ns()
    }
}

impl Drop for BundleStore {
    fn drop(&mut self) {
        self.host.cache_save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BatchOutcome;
    use crate::status::NoopStatusBackend;
    use std::collections::HashMap;

    /// A host with a canned index and bundle, for exercising the
    /// resolution order without any network.
    #[derive(Default)]
    struct FakeHost {
        index_text: Option<Vec<u8>>,
        cached_index: Option<Vec<u8>>,
        bundle: HashMap<String, (IndexEntry, Vec<u8>)>,
        cache: HashMap<String, Vec<u8>>,
        fail_cache_writes: bool,
    }

    impl FakeHost {
        fn with_files(files: &[(&str, &[u8])]) -> FakeHost {
            let mut host = FakeHost::default();
            let mut text = String::new();
            let mut offset = 0u64;

            for (name, body) in files {
                text.push_str(&format!("{} {} {}\n", name, offset, body.len()));
                host.bundle.insert(
                    (*name).to_owned(),
                    (
                        IndexEntry {
                            offset,
                            length: body.len() as u32,
                        },
                        body.to_vec(),
                    ),
                );
                offset += body.len() as u64;
            }

            host.index_text = Some(text.into_bytes());
            host
        }
    }

    impl Host for FakeHost {
        fn fetch_range(&mut self, name: &str, entry: IndexEntry) -> Result<Vec<u8>> {
            match self.bundle.values().find(|(e, _)| *e == entry) {
                Some((_, body)) => Ok(body.clone()),
                None => Err(ErrorKind::FetchFailed(name.to_owned(), "no range".into()).into()),
            }
        }

        fn fetch_index(&mut self) -> Result<Vec<u8>> {
            match &self.index_text {
                Some(t) => Ok(t.clone()),
                None => Err(ErrorKind::IndexNotLoaded.into()),
            }
        }

        fn load_cached_index(&mut self) -> Option<Vec<u8>> {
            self.cached_index.clone()
        }

        fn cache_index(&mut self, content: &[u8]) -> Result<()> {
            self.cached_index = Some(content.to_vec());
            Ok(())
        }

        fn cache_check(&mut self, name: &str) -> CacheCheck {
            if self.cache.contains_key(name) {
                CacheCheck::Hit
            } else {
                CacheCheck::Miss
            }
        }

        fn cache_open(&mut self, name: &str) -> Option<InputSource> {
            self.cache
                .get(name)
                .map(|b| InputSource::from_bytes(b.clone()))
        }

        fn cache_write(&mut self, name: &str, content: &[u8]) -> Result<()> {
            if self.fail_cache_writes {
                return Err(ErrorKind::CacheWriteFailed(name.to_owned()).into());
            }
            self.cache.insert(name.to_owned(), content.to_vec());
            Ok(())
        }

        fn cache_save(&mut self) {}

        fn batch_seed(&mut self, items: &[SeedItem], _concurrency: usize) -> BatchOutcome {
            let mut outcome = BatchOutcome::default();
            for item in items {
                match self.fetch_range(&item.name, item.entry) {
                    Ok(body) => {
                        self.cache.insert(item.name.clone(), body);
                        outcome.fetched += 1;
                    }
                    Err(_) => outcome.failed.push(item.name.clone()),
                }
            }
            outcome
        }

        fn timestamp_ns(&self) -> i128 {
            0
        }
    }

    fn read_all(mut src: InputSource) -> Vec<u8> {
        use std::io::Read;
        let mut buf = Vec::new();
        src.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn resolve_fetches_persists_and_delivers() {
        let host = FakeHost::with_files(&[("article.cls", b"% article")]);
        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        match store.resolve("article.cls", &mut status) {
            OpenResult::Ok(src) => assert_eq!(read_all(src), b"% article"),
            other => panic!("expected a hit, got {:?}", other.is_not_available()),
        }
    }

    #[test]
    fn resolve_prefers_cache_and_skips_network() {
        let mut host = FakeHost::with_files(&[("a.sty", b"net bytes")]);
        host.cache.insert("a.sty".to_owned(), b"cached bytes".to_vec());

        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        match store.resolve("a.sty", &mut status) {
            OpenResult::Ok(src) => assert_eq!(read_all(src), b"cached bytes"),
            _ => panic!("expected a cache hit"),
        }
    }

    #[test]
    fn unknown_name_is_not_available() {
        let host = FakeHost::with_files(&[("a.sty", b"x")]);
        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        assert!(store.resolve("missing.sty", &mut status).is_not_available());
    }

    #[test]
    fn unreachable_index_is_index_not_loaded() {
        let host = FakeHost::default();
        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        match store.resolve("anything.tex", &mut status) {
            OpenResult::Err(_) => {}
            _ => panic!("expected an error"),
        }
    }

    #[test]
    fn cache_only_lookup_succeeds_without_index() {
        let mut host = FakeHost::default();
        host.cache.insert("hit.tex".to_owned(), b"body".to_vec());

        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        assert!(store.has("hit.tex", &mut status));
        match store.resolve("hit.tex", &mut status) {
            OpenResult::Ok(src) => assert_eq!(read_all(src), b"body"),
            _ => panic!("expected a cache hit without any index"),
        }
    }

    #[test]
    fn index_loads_lazily_and_answers_queries() {
        let host = FakeHost::with_files(&[("a.tex", b"a"), ("b.tex", b"b")]);
        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        assert_eq!(store.count(&mut status).unwrap(), 2);
        assert!(store.has("a.tex", &mut status));
        assert!(store.has("b.tex", &mut status));
    }

    #[test]
    fn failed_cache_write_is_an_error() {
        let mut host = FakeHost::with_files(&[("a.tex", b"a")]);
        host.fail_cache_writes = true;

        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        match store.resolve("a.tex", &mut status) {
            OpenResult::Err(_) => {}
            _ => panic!("cache write failure must propagate"),
        }
    }

    #[test]
    fn seed_classifies_names() {
        let mut host = FakeHost::with_files(&[("a.tex", b"aaa"), ("b.tex", b"bbb")]);
        host.cache.insert("a.tex".to_owned(), b"aaa".to_vec());

        let mut store = BundleStore::new(Box::new(host));
        let mut status = NoopStatusBackend::new();

        let report = store
            .seed(&["a.tex", "b.tex", "nope.tex"], 4, &mut status)
            .unwrap();

        assert_eq!(
            report,
            SeedReport {
                fetched: 1,
                skipped_cached: 1,
                skipped_unknown: 1,
                failed: 0,
            }
        );
    }
}
