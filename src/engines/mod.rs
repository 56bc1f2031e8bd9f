// src/engines/mod.rs -- access to the external C engines
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

//! Safe wrappers around the legacy C engines: XeTeX, xdvipdfmx, and
//! BibTeX. The engines are invoked as black boxes through a handful of
//! entry points; the C library providing them is linked into the final
//! artifact by the distribution build, and none of it is reentrant, so a
//! global lock serializes every invocation.

pub mod bibtex;
pub mod tex;
pub mod xdvipdfmx;

pub use self::bibtex::{BibtexEngine, BibtexOutcome};
pub use self::tex::{TexEngine, TexOutcome};
pub use self::xdvipdfmx::XdvipdfmxEngine;

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::sync::Mutex;

lazy_static! {
    /// The engines share mutable global state in C, so only one of them
    /// may run at a time, process-wide.
    pub(crate) static ref ENGINE_LOCK: Mutex<()> = Mutex::new(());
}

/// The engine's format-serial version. Format files depend sensitively on
/// engine internals, so this value participates in every format-cache key.
pub const ENGINE_VERSION: u32 = 33;

/// Lifecycle events the engine reports through the checkpoint callback.
pub const CHECKPOINT_FORMAT_LOADED: c_int = 1;

extern "C" {
    fn xetex_main(dump_name: *const c_char, input_name: *const c_char, build_date: u64) -> c_int;

    fn xdvipdfmx_main(
        config: *const self::xdvipdfmx::XdvipdfmxConfig,
        dvi_name: *const c_char,
        pdf_name: *const c_char,
    ) -> c_int;

    fn bibtex_main(aux_name: *const c_char) -> c_int;

    fn set_int_variable(var_name: *const c_char, value: c_int) -> c_int;

    fn get_last_error_message() -> *const c_char;

    fn set_checkpoint_callback(cb: extern "C" fn(c_int));
}

pub(crate) unsafe fn run_xetex(dump: *const c_char, input: *const c_char, build_date: u64) -> c_int {
    xetex_main(dump, input, build_date)
}

pub(crate) unsafe fn run_xdvipdfmx(
    config: *const self::xdvipdfmx::XdvipdfmxConfig,
    dvi: *const c_char,
    pdf: *const c_char,
) -> c_int {
    xdvipdfmx_main(config, dvi, pdf)
}

pub(crate) unsafe fn run_bibtex(aux: *const c_char) -> c_int {
    bibtex_main(aux)
}

/// Set one of the engine's integer knobs (`halt_on_error_p`,
/// `in_initex_mode`, `synctex_enabled`, `semantic_pagination_enabled`,
/// `shell_escape_enabled`).
pub(crate) fn set_engine_int_variable(name: &[u8], value: c_int) {
    debug_assert!(name.ends_with(b"\0"));
    unsafe {
        set_int_variable(name.as_ptr() as *const c_char, value);
    }
}

/// Fetch the engine's last-resort error string, set just before a
/// longjmp-based abort. Always consume this after a non-success return.
pub fn last_engine_error() -> String {
    unsafe {
        let ptr = get_last_error_message();
        if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

/// Install the process-wide checkpoint hook. The only event currently
/// reported is "format loaded", which is useful for timing diagnostics.
pub fn install_checkpoint_callback() {
    unsafe {
        set_checkpoint_callback(checkpoint_hook);
    }
}

use std::sync::atomic::{AtomicI64, Ordering};

static LAST_CHECKPOINT_EVENT: AtomicI64 = AtomicI64::new(0);

extern "C" fn checkpoint_hook(event: c_int) {
    LAST_CHECKPOINT_EVENT.store(i64::from(event), Ordering::SeqCst);
}

pub fn last_checkpoint_event() -> i64 {
    LAST_CHECKPOINT_EVENT.load(Ordering::SeqCst)
}
