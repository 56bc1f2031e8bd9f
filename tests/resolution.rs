// tests/resolution.rs -- end-to-end name resolution without a network
// Copyright 2020 the Tectonic Project
// Licensed under the MIT License.

//! Drives the world's resolution chain (working directory, search dirs,
//! extension sets, bundle store) against an in-memory host, the way the
//! engine drives it during a pass.

use std::collections::HashMap;
use std::fs;
use std::io::Read;

use eztex::bundle::BundleStore;
use eztex::errors::{ErrorKind, Result};
use eztex::host::{BatchOutcome, CacheCheck, Host, InputSource, OpenResult, SeedItem};
use eztex::itar::IndexEntry;
use eztex::status::NoopStatusBackend;
use eztex::world::{FileFormat, World};

/// A host whose "bundle" and "persistent cache" are hash maps.
#[derive(Default)]
struct MapHost {
    index_text: String,
    bodies: HashMap<String, Vec<u8>>,
    cache: HashMap<String, Vec<u8>>,
}

impl MapHost {
    fn new(files: &[(&str, &[u8])]) -> MapHost {
        let mut host = MapHost::default();
        let mut offset = 0u64;

        for (name, body) in files {
            host.index_text
                .push_str(&format!("{} {} {}\n", name, offset, body.len()));
            host.bodies.insert(
                format!("{}:{}", offset, body.len()),
                body.to_vec(),
            );
            offset += body.len() as u64;
        }

        host
    }
}

impl Host for MapHost {
    fn fetch_range(&mut self, name: &str, entry: IndexEntry) -> Result<Vec<u8>> {
        self.bodies
            .get(&format!("{}:{}", entry.offset, entry.length))
            .cloned()
            .ok_or_else(|| {
                ErrorKind::FetchFailed(name.to_owned(), "unknown range".to_owned()).into()
            })
    }

    fn fetch_index(&mut self) -> Result<Vec<u8>> {
        Ok(self.index_text.clone().into_bytes())
    }

    fn load_cached_index(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn cache_index(&mut self, _content: &[u8]) -> Result<()> {
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

fn read_handle(world: &mut World, h: eztex::world::Handle) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = world.input_read(h, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn local_files_shadow_the_bundle() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("article.cls"), b"local article").unwrap();

    let host = MapHost::new(&[("article.cls", b"bundle article")]);

    let mut world = World::new();
    world.add_search_dir(dir.path()).unwrap();
    world.attach_bundle(BundleStore::new(Box::new(host)));

    let mut status = NoopStatusBackend::new();

    match world.try_open_input("article.cls", FileFormat::Tex, &mut status) {
        OpenResult::Ok(h) => assert_eq!(read_handle(&mut world, h), b"local article"),
        _ => panic!("local file should win over the bundle"),
    }
}

#[test]
fn bundle_serves_names_with_appended_extensions() {
    let host = MapHost::new(&[("article.cls", b"bundle article")]);

    let mut world = World::new();
    world.attach_bundle(BundleStore::new(Box::new(host)));

    let mut status = NoopStatusBackend::new();

    // The engine asks for "article"; the TEX extension set supplies .cls.
    match world.try_open_input("article", FileFormat::Tex, &mut status) {
        OpenResult::Ok(h) => {
            assert_eq!(world.input_name(h), Some("article.cls"));
            assert_eq!(read_handle(&mut world, h), b"bundle article");
        }
        _ => panic!("the bundle should resolve article -> article.cls"),
    }
}

#[test]
fn fonts_prefix_resolves_to_bare_index_name() {
    let host = MapHost::new(&[("lmroman10-regular.otf", b"OTTO-bytes")]);

    let mut world = World::new();
    world.attach_bundle(BundleStore::new(Box::new(host)));

    let mut status = NoopStatusBackend::new();

    match world.try_open_input(
        "fonts/lmroman10-regular.otf",
        FileFormat::OpenType,
        &mut status,
    ) {
        OpenResult::Ok(h) => assert_eq!(read_handle(&mut world, h), b"OTTO-bytes"),
        _ => panic!("the fonts/ prefix rule should apply inside the store"),
    }
}

#[test]
fn second_open_is_served_from_the_cache() {
    let host = MapHost::new(&[("lmodern.sty", b"sty bytes")]);

    let mut store = BundleStore::new(Box::new(host));
    let mut status = NoopStatusBackend::new();

    for _ in 0..2 {
        match store.resolve("lmodern.sty", &mut status) {
            OpenResult::Ok(mut src) => {
                let mut buf = Vec::new();
                src.read_to_end(&mut buf).unwrap();
                assert_eq!(buf, b"sty bytes");
            }
            _ => panic!("expected a hit"),
        }
    }

    // One fetch went over the "network"; the second open hit the cache.
    assert!(store.has("lmodern.sty", &mut status));
}

#[test]
fn missing_everywhere_reports_not_found() {
    let host = MapHost::new(&[("exists.tex", b"x")]);

    let mut world = World::new();
    world.attach_bundle(BundleStore::new(Box::new(host)));

    let mut status = NoopStatusBackend::new();

    assert!(world
        .try_open_input("missing_file", FileFormat::Tex, &mut status)
        .is_not_available());
}

#[test]
fn seeding_prefills_the_cache_for_the_world() {
    let host = MapHost::new(&[("article.cls", b"one"), ("size10.clo", b"two")]);

    let mut store = BundleStore::new(Box::new(host));
    let mut status = NoopStatusBackend::new();

    let report = store
        .seed(&["article.cls", "size10.clo", "unknown.xyz"], 2, &mut status)
        .unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped_unknown, 1);

    let mut world = World::new();
    world.attach_bundle(store);

    match world.try_open_input("size10.clo", FileFormat::Tex, &mut status) {
        OpenResult::Ok(h) => assert_eq!(read_handle(&mut world, h), b"two"),
        _ => panic!("a seeded file should open"),
    }
}
