// src/errors.rs -- error types for eztex
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

//! The crate-wide error chain. Every subsystem returns a typed error that its
//! caller either recovers (host-level fetch retries, non-fatal bibtex runs)
//! or escalates; the compile driver eventually translates whatever reaches it
//! into a process exit code.

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    foreign_links {
        Io(::std::io::Error);
        Json(::serde_json::Error);
        Nul(::std::ffi::NulError);
        ParseInt(::std::num::ParseIntError);
        Reqwest(::reqwest::Error) #[cfg(not(target_arch = "wasm32"))];
        SystemTime(::std::time::SystemTimeError);
        Utf8(::std::str::Utf8Error);
        Zip(::zip::result::ZipError);
    }

    errors {
        /// The name is neither in the persistent cache nor in the bundle
        /// index. The world surfaces this to the engine as "not found" and
        /// lets the engine decide what that means.
        NotFound(name: String) {
            description("file not found in cache or bundle index")
            display("the file \"{}\" is not in the local cache or the bundle index", name)
        }

        /// The bundle index could not be obtained at all: the persistent
        /// index cache was empty and the host could not reach the network.
        IndexNotLoaded {
            description("bundle index not loaded")
            display("the bundle index is unavailable; cannot resolve bundle files")
        }

        /// A byte-range request against the bundle failed after retries.
        FetchFailed(name: String, detail: String) {
            description("bundle fetch failed")
            display("failed to fetch \"{}\" from the bundle: {}", name, detail)
        }

        /// The filesystem refused to record a successfully fetched file. The
        /// cache stays consistent: no manifest entry is recorded for a body
        /// that did not land on disk.
        CacheWriteFailed(name: String) {
            description("cache write failed")
            display("failed to write \"{}\" into the local cache", name)
        }

        /// One of the external C engines reported an unrecoverable outcome.
        EngineError(engine: &'static str) {
            description("engine invocation failed")
            display("the {} engine failed", engine)
        }

        /// A payload did not have the size its index entry promised.
        BadLength(expected: usize, observed: usize) {
            description("payload length mismatch")
            display("expected payload of {} bytes but got {}", expected, observed)
        }

        /// All 256 slots of one of the world's handle tables are occupied.
        HandleExhausted(kind: &'static str) {
            description("file handle table exhausted")
            display("too many open {} files", kind)
        }
    }
}
