// src/engines/bibtex.rs -- Rustic interface to the BibTeX engine.
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

use std::ffi::CString;

use crate::errors::Result;

/// The outcome of a BibTeX run. BibTeX problems never abort a compile: a
/// non-zero exit is reported as a warning and the pass loop continues.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BibtexOutcome {
    Spotless,
    Warnings,
}

#[derive(Debug, Default)]
pub struct BibtexEngine {}

impl BibtexEngine {
    pub fn new() -> BibtexEngine {
        Default::default()
    }

    /// Process the job's `.aux` file, writing the `.bbl` it names.
    pub fn process(&mut self, aux_name: &str) -> Result<BibtexOutcome> {
        let _guard = super::ENGINE_LOCK.lock().unwrap();

        let caux = CString::new(aux_name)?;

        let rc = unsafe { super::run_bibtex(caux.as_ptr()) };

        if rc == 0 {
            Ok(BibtexOutcome::Spotless)
        } else {
            Ok(BibtexOutcome::Warnings)
        }
    }
}
