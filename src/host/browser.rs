// src/host/browser.rs -- the browser worker host
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! The browser side of the host boundary. The engine's file resolution is
//! synchronous, so the hot path is a synchronous XHR performed by the
//! embedding worker through `js_request_range`, writing the response into
//! linear memory it allocates through `eztex_alloc`. Persistence goes to
//! the origin-private filesystem, but from the hot path writes are
//! fire-and-forget: the worker drains them in the background.
//!
//! This module also carries the exported query surface the worker calls on
//! its long-lived "API" instance: index loading and lookup, seed lists,
//! cache-version and URL queries, and main-file detection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::raw::c_int;
use std::slice;

use super::{CacheCheck, Host, InputSource};
use crate::bundle::seed;
use crate::config;
use crate::errors::{ErrorKind, Result};
use crate::itar::{BundleIndex, IndexEntry};
use crate::project;
use crate::worker;

extern "C" {
    /// Synchronous ranged XHR. The embedder allocates the response buffer
    /// through `eztex_alloc`, stores its address and length through the two
    /// out-pointers, and returns 0; any failure returns -1.
    fn js_request_range(
        name_ptr: *const u8,
        name_len: usize,
        offset_lo: u32,
        offset_hi: u32,
        length: u32,
        out_ptr: *mut *mut u8,
        out_len: *mut usize,
    ) -> c_int;

    /// Hand back the index bytes the worker already fetched and
    /// decompressed. Same buffer protocol as `js_request_range`.
    fn js_request_index(out_ptr: *mut *mut u8, out_len: *mut usize) -> c_int;

    /// Queue one body for the OPFS drain. Fire-and-forget.
    fn js_cache_write(name_ptr: *const u8, name_len: usize, data_ptr: *const u8, data_len: usize);

    /// Wall time in milliseconds.
    fn js_now_ms() -> f64;
}

thread_local! {
    /// State of the long-lived API instance. The worker is single-threaded
    /// and cooperative, so a thread-local cell is all the synchronization
    /// this needs.
    static API: RefCell<ApiState> = RefCell::new(ApiState::default());
}

#[derive(Default)]
struct ApiState {
    index: BundleIndex,
    index_loaded: bool,
}

/// The in-worker host. The memory cache fronts OPFS; entries seeded by the
/// worker before a compile land here, and anything fetched during a compile
/// is queued back out through `js_cache_write`.
#[derive(Default)]
pub struct BrowserHost {
    memory: HashMap<String, Vec<u8>>,
}

impl BrowserHost {
    pub fn new() -> BrowserHost {
        Default::default()
    }

    /// Install a body in the memory cache without touching OPFS, for
    /// entries the worker already persisted.
    pub fn preload(&mut self, name: &str, content: Vec<u8>) {
        self.memory.insert(name.to_owned(), content);
    }
}

fn take_buffer(ptr: *mut u8, len: usize) -> Vec<u8> {
    // The embedder allocated this through eztex_alloc, which uses the
    // ordinary Rust allocator, so reclaiming it as a Vec is sound.
    unsafe { Vec::from_raw_parts(ptr, len, len) }
}

impl Host for BrowserHost {
    fn fetch_range(&mut self, name: &str, entry: IndexEntry) -> Result<Vec<u8>> {
        let mut ptr: *mut u8 = std::ptr::null_mut();
        let mut len: usize = 0;

        let rc = unsafe {
            js_request_range(
                name.as_ptr(),
                name.len(),
                entry.offset as u32,
                (entry.offset >> 32) as u32,
                entry.length,
                &mut ptr,
                &mut len,
            )
        };

        if rc != 0 || ptr.is_null() {
            return Err(ErrorKind::FetchFailed(
                name.to_owned(),
                "synchronous range request failed".to_owned(),
            )
            .into());
        }

        let body = take_buffer(ptr, len);

        if body.len() != entry.length as usize {
            return Err(ErrorKind::BadLength(entry.length as usize, body.len()).into());
        }

        Ok(body)
    }

    fn fetch_index(&mut self) -> Result<Vec<u8>> {
        let mut ptr: *mut u8 = std::ptr::null_mut();
        let mut len: usize = 0;

        let rc = unsafe { js_request_index(&mut ptr, &mut len) };

        if rc != 0 || ptr.is_null() || len == 0 {
            // The worker has not injected an index; there is no network
            // fallback on this side of the boundary.
            return Err(ErrorKind::IndexNotLoaded.into());
        }

        Ok(take_buffer(ptr, len))
    }

    fn load_cached_index(&mut self) -> Option<Vec<u8>> {
        // The worker owns the OPFS copy of the index and pushes it through
        // js_request_index, so the two index paths coincide here.
        self.fetch_index().ok()
    }

    fn cache_index(&mut self, _content: &[u8]) -> Result<()> {
        // Persisting the index is the worker's job in the browser.
        Ok(())
    }

    fn cache_check(&mut self, name: &str) -> CacheCheck {
        if self.memory.contains_key(name) {
            CacheCheck::Hit
        } else {
            // OPFS lookups are asynchronous; from the synchronous hot path
            // anything not already in memory is unknowable.
            CacheCheck::Unsupported
        }
    }

    fn cache_open(&mut self, name: &str) -> Option<InputSource> {
        self.memory
            .get(name)
            .map(|bytes| InputSource::from_bytes(bytes.clone()))
    }

    fn cache_write(&mut self, name: &str, content: &[u8]) -> Result<()> {
        unsafe {
            js_cache_write(name.as_ptr(), name.len(), content.as_ptr(), content.len());
        }
        self.memory.insert(name.to_owned(), content.to_vec());
        Ok(())
    }

    fn cache_save(&mut self) {}

    fn timestamp_ns(&self) -> i128 {
        let ms = unsafe { js_now_ms() };
        (ms * 1_000_000.0) as i128
    }
}

// -------------------------------------------------------------------------
// The exported surface of the module. All exports use raw pointers plus
// explicit lengths; strings are UTF-8, never NUL-terminated.

/// Allocate `size` bytes inside the module for the embedder to fill.
#[no_mangle]
pub extern "C" fn eztex_alloc(size: usize) -> *mut u8 {
    let mut buf = Vec::<u8>::with_capacity(size);
    let ptr = buf.as_mut_ptr();
    std::mem::forget(buf);
    ptr
}

/// Release a buffer previously obtained from `eztex_alloc`.
///
/// # Safety
///
/// `ptr` must have come from `eztex_alloc(size)` and not been freed since.
#[no_mangle]
pub unsafe extern "C" fn eztex_free(ptr: *mut u8, size: usize) {
    if !ptr.is_null() {
        drop(Vec::from_raw_parts(ptr, 0, size));
    }
}

/// Load index text into the API instance. Returns 0 on success, -1 when
/// the bytes are not UTF-8.
#[no_mangle]
pub extern "C" fn eztex_push_index(ptr: *const u8, len: usize) -> c_int {
    let bytes = unsafe { slice::from_raw_parts(ptr, len) };

    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return -1,
    };

    API.with(|api| {
        let mut api = api.borrow_mut();
        api.index.load_from_text(text);
        api.index_loaded = true;
    });

    0
}

/// Resolve one name against the loaded index, for range planning. Returns
/// 0 and fills the out-params on a hit; -1 on a miss or unloaded index.
#[no_mangle]
pub extern "C" fn eztex_query_index(
    name_ptr: *const u8,
    name_len: usize,
    out_offset: *mut u64,
    out_length: *mut u32,
) -> c_int {
    let bytes = unsafe { slice::from_raw_parts(name_ptr, name_len) };

    let name = match std::str::from_utf8(bytes) {
        Ok(n) => n,
        Err(_) => return -1,
    };

    API.with(|api| {
        let api = api.borrow();
        if !api.index_loaded {
            return -1;
        }

        match api.index.get(name) {
            Some(entry) => {
                unsafe {
                    *out_offset = entry.offset;
                    *out_length = entry.length;
                }
                0
            }
            None => -1,
        }
    })
}

fn write_out(text: &str, out_ptr: *mut u8, cap: usize) -> usize {
    let bytes = text.as_bytes();
    let n = bytes.len().min(cap);
    unsafe {
        slice::from_raw_parts_mut(out_ptr, n).copy_from_slice(&bytes[..n]);
    }
    n
}

/// The cache-version stamp for the configured bundle, used by the worker to
/// decide whether OPFS must be invalidated.
#[no_mangle]
pub extern "C" fn eztex_query_cache_version(out_ptr: *mut u8, cap: usize) -> usize {
    let endpoints = config::BundleEndpoints::resolve(None);
    write_out(&worker::cache_version_stamp(&endpoints.digest), out_ptr, cap)
}

#[no_mangle]
pub extern "C" fn eztex_query_bundle_url(out_ptr: *mut u8, cap: usize) -> usize {
    let endpoints = config::BundleEndpoints::resolve(None);
    write_out(&endpoints.bundle_url, out_ptr, cap)
}

#[no_mangle]
pub extern "C" fn eztex_query_index_url(out_ptr: *mut u8, cap: usize) -> usize {
    let endpoints = config::BundleEndpoints::resolve(None);
    write_out(&endpoints.index_url, out_ptr, cap)
}

/// The newline-joined list of files every compile touches before user
/// macros run.
#[no_mangle]
pub extern "C" fn eztex_query_seed_init(out_ptr: *mut u8, cap: usize) -> usize {
    write_out(seed::INIT_SEED, out_ptr, cap)
}

/// The additional files only initex needs when generating the LaTeX format.
#[no_mangle]
pub extern "C" fn eztex_query_seed_format(out_ptr: *mut u8, cap: usize) -> usize {
    write_out(seed::FORMAT_SEED, out_ptr, cap)
}

/// Pick the main `.tex` out of a newline-joined file list. Returns the
/// number of bytes written; 0 means no candidate.
#[no_mangle]
pub extern "C" fn eztex_query_main_file(
    list_ptr: *const u8,
    list_len: usize,
    out_ptr: *mut u8,
    cap: usize,
) -> usize {
    let bytes = unsafe { slice::from_raw_parts(list_ptr, list_len) };

    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => return 0,
    };

    let names: Vec<String> = text
        .lines()
        .map(|l| l.trim().to_owned())
        .filter(|l| !l.is_empty())
        .collect();

    match project::detect_main_file(&names, None) {
        Some(main) => write_out(&main, out_ptr, cap),
        None => 0,
    }
}
