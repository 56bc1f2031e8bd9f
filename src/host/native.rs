// src/host/native.rs -- the POSIX + HTTP host
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! The command-line host: blocking byte-range HTTP against the bundle, a
//! content-addressed cache on the local disk, and a small thread pool for
//! batch seeding.

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{
    fetch_timeout_secs, BatchOutcome, CacheCheck, Host, InputSource, SeedItem,
    INDEX_FETCH_TIMEOUT_SECS,
};
use crate::cache::LocalCache;
use crate::config::BundleEndpoints;
use crate::digest::DigestData;
use crate::errors::{ErrorKind, Result};

/// Delay before the single retry a failed range request gets at this level.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Backoffs for the per-item retries of a batch seed.
const BATCH_RETRY_BACKOFFS: &[Duration] = &[Duration::from_secs(1), Duration::from_secs(2)];

pub struct NativeHost {
    client: Client,
    cache: LocalCache,
    bundle_url: String,
    index_url: String,
    digest: DigestData,
}

impl NativeHost {
    pub fn new(cache_root: &Path, endpoints: &BundleEndpoints) -> Result<NativeHost> {
        let cache = LocalCache::open(cache_root, &endpoints.digest)?;

        Ok(NativeHost {
            client: build_client()?,
            cache,
            bundle_url: endpoints.bundle_url.clone(),
            index_url: endpoints.index_url.clone(),
            digest: endpoints.digest,
        })
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn formats_dir(&self) -> std::path::PathBuf {
        self.cache.formats_dir()
    }
}

fn build_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("eztex/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// One attempt at a byte-range request.
fn fetch_entry_once(
    client: &Client,
    bundle_url: &str,
    entry: crate::itar::IndexEntry,
) -> Result<Vec<u8>> {
    if entry.length == 0 {
        return Ok(Vec::new());
    }

    let end_inclusive = entry.offset + u64::from(entry.length) - 1;

    let resp = client
        .get(bundle_url)
        .header(RANGE, format!("bytes={}-{}", entry.offset, end_inclusive))
        .timeout(Duration::from_secs(fetch_timeout_secs(entry.length)))
        .send()?;

    match resp.status() {
        StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
        status => {
            return Err(crate::errmsg!(
                "unexpected HTTP status {} for a range request",
                status
            ));
        }
    }

    let body = resp.bytes()?.to_vec();

    if body.len() != entry.length as usize {
        return Err(ErrorKind::BadLength(entry.length as usize, body.len()).into());
    }

    Ok(body)
}

/// A range request with the native level's one retry.
fn fetch_entry(
    client: &Client,
    bundle_url: &str,
    name: &str,
    entry: crate::itar::IndexEntry,
) -> Result<Vec<u8>> {
    match fetch_entry_once(client, bundle_url, entry) {
        Ok(body) => Ok(body),
        Err(first) => {
            thread::sleep(RETRY_BACKOFF);
            fetch_entry_once(client, bundle_url, entry).map_err(|_| {
                ErrorKind::FetchFailed(name.to_owned(), first.to_string()).into()
            })
        }
    }
}

impl Host for NativeHost {
    fn fetch_range(&mut self, name: &str, entry: crate::itar::IndexEntry) -> Result<Vec<u8>> {
        fetch_entry(&self.client, &self.bundle_url, name, entry)
    }

    fn fetch_index(&mut self) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&self.index_url)
            .timeout(Duration::from_secs(INDEX_FETCH_TIMEOUT_SECS))
            .send()?;

        if !resp.status().is_success() {
            return Err(crate::errmsg!(
                "unexpected HTTP status {} fetching the bundle index",
                resp.status()
            ));
        }

        // The index is gzipped on the wire.
        let mut text = Vec::new();
        GzDecoder::new(resp).read_to_end(&mut text)?;
        Ok(text)
    }

    fn load_cached_index(&mut self) -> Option<Vec<u8>> {
        self.cache.load_index(&self.digest)
    }

    fn cache_index(&mut self, content: &[u8]) -> Result<()> {
        self.cache.store_index(&self.digest, content)
    }

    fn cache_check(&mut self, name: &str) -> CacheCheck {
        if self.cache.contains(name) {
            CacheCheck::Hit
        } else {
            CacheCheck::Miss
        }
    }

    fn cache_open(&mut self, name: &str) -> Option<InputSource> {
        self.cache.open_file(name).map(InputSource::File)
    }

    fn cache_write(&mut self, name: &str, content: &[u8]) -> Result<()> {
        self.cache.write(name, content)
    }

    fn cache_save(&mut self) {
        let _ = self.cache.save();
    }

    fn batch_seed(&mut self, items: &[SeedItem], concurrency: usize) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        if items.is_empty() {
            return outcome;
        }

        let n_workers = concurrency.min(items.len()).max(1);
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, Result<Vec<u8>>)>> = Mutex::new(Vec::new());
        let bundle_url = &self.bundle_url;

        // Work-stealing over a shared index; each worker gets its own HTTP
        // connection. Results are collected and all cache/manifest writes
        // happen serially afterwards on this thread.
        thread::scope(|scope| {
            for _ in 0..n_workers {
                scope.spawn(|| {
                    let client = match build_client() {
                        Ok(c) => c,
                        Err(_) => return,
                    };

                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        if i >= items.len() {
                            break;
                        }

                        let item = &items[i];
                        let r = fetch_entry_once(&client, bundle_url, item.entry);
                        results.lock().unwrap().push((i, r));
                    }
                });
            }
        });

        let mut fetched = results.into_inner().unwrap();

        // A worker that failed to build its client leaves holes; treat those
        // items as failures so the retry pass picks them up.
        let mut seen = vec![false; items.len()];
        for (i, _) in &fetched {
            seen[*i] = true;
        }
        for (i, was_seen) in seen.iter().enumerate() {
            if !was_seen {
                fetched.push((i, Err(crate::errmsg!("no fetch attempted"))));
            }
        }

        let mut retry_queue = Vec::new();

        for (i, result) in fetched {
            let item = &items[i];
            match result {
                Ok(body) => match self.cache.write(&item.name, &body) {
                    Ok(()) => outcome.fetched += 1,
                    Err(_) => outcome.failed.push(item.name.clone()),
                },
                Err(_) => retry_queue.push(i),
            }
        }

        // Failed entries are retried individually, with backoff and without
        // the pool.
        'retry: for i in retry_queue {
            let item = &items[i];

            for backoff in BATCH_RETRY_BACKOFFS {
                thread::sleep(*backoff);

                if let Ok(body) = fetch_entry_once(&self.client, &self.bundle_url, item.entry) {
                    match self.cache.write(&item.name, &body) {
                        Ok(()) => outcome.fetched += 1,
                        Err(_) => outcome.failed.push(item.name.clone()),
                    }
                    continue 'retry;
                }
            }

            outcome.failed.push(item.name.clone());
        }

        outcome
    }

    fn timestamp_ns(&self) -> i128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0)
    }
}
