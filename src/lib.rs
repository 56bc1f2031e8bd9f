// src/lib.rs -- the eztex library
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

//! eztex is a TeX/LaTeX compiler distribution that runs identically on the
//! command line and inside a browser worker. The XeTeX engine itself is an
//! external C library with a narrow entry-point contract; everything in this
//! crate is the machinery that feeds it: a content-addressed on-demand
//! fetcher that resolves support files against a remote bundle, a two-level
//! (memory + persistent) cache, a multi-pass compile driver with aux-file
//! fixed-point detection, a format-file generator with its own cache, and a
//! host abstraction mapping all of this onto either a POSIX filesystem plus
//! HTTP or a browser's private filesystem plus byte-range XHR.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod status;

pub mod bundle;
pub mod config;
pub mod digest;
pub mod driver;
pub mod engines;
pub mod errors;
pub mod format_cache;
pub mod host;
pub mod itar;
pub mod project;
#[cfg(not(target_arch = "wasm32"))]
pub mod watch;
pub mod worker;
pub mod world;

#[cfg(not(target_arch = "wasm32"))]
pub mod cache;

pub use crate::errors::{Error, ErrorKind, Result};

/// Convenience macro for creating a chained `Error` out of a formatted
/// message.
#[macro_export]
macro_rules! errmsg {
    ($( $fmt_args:expr ),*) => {
        $crate::errors::Error::from_kind(
            $crate::errors::ErrorKind::Msg(format!($( $fmt_args ),*))
        )
    };
}

/// "Chained try": like `?`, but with the ability to add context to the
/// error message.
#[macro_export]
macro_rules! ctry {
    ($op:expr ; $( $chain_fmt_args:expr ),*) => {
        {
            use $crate::errors::ResultExt;
            $op.chain_err(|| format!($( $chain_fmt_args ),*))?
        }
    };
}
