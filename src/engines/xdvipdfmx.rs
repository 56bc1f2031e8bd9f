// src/engines/xdvipdfmx.rs -- Rustic interface to the xdvipdfmx engine.
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

use std::ffi::CString;
use std::os::raw::c_int;
use std::time::SystemTime;

use crate::errors::{ErrorKind, Result};

/// The configuration record handed across the C boundary.
#[repr(C)]
pub struct XdvipdfmxConfig {
    paperspec: *const std::os::raw::c_char,
    enable_compression: c_int,
    deterministic_tags: c_int,
    build_date: u64,
}

#[derive(Debug)]
pub struct XdvipdfmxEngine {
    enable_compression: bool,
    deterministic_tags: bool,
    paperspec: String,
    build_date: SystemTime,
}

impl Default for XdvipdfmxEngine {
    fn default() -> Self {
        XdvipdfmxEngine {
            enable_compression: true,
            deterministic_tags: false,
            paperspec: "letter".to_owned(),
            build_date: SystemTime::UNIX_EPOCH,
        }
    }
}

impl XdvipdfmxEngine {
    pub fn new() -> XdvipdfmxEngine {
        Default::default()
    }

    pub fn enable_compression(&mut self, enable: bool) -> &mut Self {
        self.enable_compression = enable;
        self
    }

    /// Use stable identifiers in the generated PDF instead of
    /// content-derived randomized tags, for reproducible output.
    pub fn deterministic_tags(&mut self, deterministic: bool) -> &mut Self {
        self.deterministic_tags = deterministic;
        self
    }

    pub fn build_date(&mut self, date: SystemTime) -> &mut Self {
        self.build_date = date;
        self
    }

    /// Translate a finished XDV file into the final PDF.
    pub fn process(&mut self, dvi_name: &str, pdf_name: &str) -> Result<()> {
        let _guard = super::ENGINE_LOCK.lock().unwrap();

        let cdvi = CString::new(dvi_name)?;
        let cpdf = CString::new(pdf_name)?;
        let cpaperspec = CString::new(self.paperspec.as_str())?;

        let config = XdvipdfmxConfig {
            paperspec: cpaperspec.as_ptr(),
            enable_compression: self.enable_compression as c_int,
            deterministic_tags: self.deterministic_tags as c_int,
            build_date: self
                .build_date
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("invalid build date")
                .as_secs(),
        };

        let rc = unsafe { super::run_xdvipdfmx(&config, cdvi.as_ptr(), cpdf.as_ptr()) };

        if rc == 0 {
            Ok(())
        } else {
            let msg = super::last_engine_error();
            Err(crate::errors::Error::with_chain(
                crate::errmsg!("{}", msg),
                ErrorKind::EngineError("xdvipdfmx"),
            ))
        }
    }
}
