// src/engines/tex.rs -- Rustic interface to the core TeX engine.
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

use std::ffi::CString;
use std::time::SystemTime;

use crate::errors::{ErrorKind, Result};

/// The outcome of a TeX pass. The engine's fourth "history" state, fatal
/// error, surfaces as an `Err` carrying the engine's last error message
/// rather than as a variant here.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TexOutcome {
    Spotless,
    Warnings,
    Errors,
}

impl TexOutcome {
    /// Spotless and warnings-only runs both count as success; anything
    /// past the warning history state stops the pass loop.
    pub fn is_success(self) -> bool {
        matches!(self, TexOutcome::Spotless | TexOutcome::Warnings)
    }
}

#[derive(Debug)]
pub struct TexEngine {
    // The engine holds its real state in C globals; this struct is a proxy
    // that pushes the knob settings down right before each run.
    halt_on_error: bool,
    initex_mode: bool,
    synctex_enabled: bool,
    semantic_pagination_enabled: bool,
    build_date: SystemTime,
}

impl Default for TexEngine {
    fn default() -> Self {
        TexEngine {
            halt_on_error: true,
            initex_mode: false,
            synctex_enabled: false,
            semantic_pagination_enabled: false,
            build_date: SystemTime::UNIX_EPOCH,
        }
    }
}

impl TexEngine {
    pub fn new() -> TexEngine {
        TexEngine::default()
    }

    pub fn halt_on_error_mode(&mut self, halt_on_error: bool) -> &mut Self {
        self.halt_on_error = halt_on_error;
        self
    }

    /// Configure the engine to run in "initex" mode, in which it generates
    /// a "format" file that serializes the engine state rather than a
    /// typeset document.
    pub fn initex_mode(&mut self, initex: bool) -> &mut Self {
        self.initex_mode = initex;
        self
    }

    /// Configure the engine to produce SyncTeX data.
    pub fn synctex(&mut self, synctex_enabled: bool) -> &mut Self {
        self.synctex_enabled = synctex_enabled;
        self
    }

    /// Configure the engine to use "semantic pagination", where top-level
    /// boxes are emitted as they are built instead of being paginated.
    pub fn semantic_pagination(&mut self, enabled: bool) -> &mut Self {
        self.semantic_pagination_enabled = enabled;
        self
    }

    /// Set the date and time seen by the engine (`\today` and friends, and
    /// the timestamps embedded in its outputs). Deterministic builds pin
    /// this to a fixed value.
    pub fn build_date(&mut self, date: SystemTime) -> &mut Self {
        self.build_date = date;
        self
    }

    /// Run one full engine pass: preload the named format dump, process
    /// the named input.
    pub fn process(&mut self, format_name: &str, input_name: &str) -> Result<TexOutcome> {
        let _guard = super::ENGINE_LOCK.lock().unwrap();

        let cformat = CString::new(format_name)?;
        let cinput = CString::new(input_name)?;

        super::set_engine_int_variable(b"halt_on_error_p\0", self.halt_on_error as _);
        super::set_engine_int_variable(b"in_initex_mode\0", self.initex_mode as _);
        super::set_engine_int_variable(b"synctex_enabled\0", self.synctex_enabled as _);
        super::set_engine_int_variable(
            b"semantic_pagination_enabled\0",
            self.semantic_pagination_enabled as _,
        );
        // Shell escape stays off unconditionally.
        super::set_engine_int_variable(b"shell_escape_enabled\0", 0);

        let build_date = self
            .build_date
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("invalid build date")
            .as_secs();

        let history =
            unsafe { super::run_xetex(cformat.as_ptr(), cinput.as_ptr(), build_date) };

        match history {
            0 => Ok(TexOutcome::Spotless),
            1 => Ok(TexOutcome::Warnings),
            2 => Ok(TexOutcome::Errors),
            3 => {
                let msg = super::last_engine_error();
                Err(crate::errors::Error::with_chain(
                    crate::errmsg!("{}", msg),
                    ErrorKind::EngineError("xetex"),
                ))
            }
            x => Err(crate::errmsg!(
                "internal error: unexpected 'history' value {}",
                x
            )),
        }
    }
}
