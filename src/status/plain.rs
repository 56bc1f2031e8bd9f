// src/status/plain.rs -- plain-text status backend
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

use super::{ChatterLevel, MessageKind, StatusBackend};
use crate::errors::Error;
use std::fmt::Arguments;
use std::io::{self, Write};

pub struct PlainStatusBackend {
    chatter: ChatterLevel,
}

impl PlainStatusBackend {
    pub fn new(chatter: ChatterLevel) -> Self {
        PlainStatusBackend { chatter }
    }
}

impl StatusBackend for PlainStatusBackend {
    fn report(&mut self, kind: MessageKind, args: Arguments, err: Option<&Error>) {
        if kind == MessageKind::Note && self.chatter <= ChatterLevel::Minimal {
            return;
        }

        let prefix = match kind {
            MessageKind::Note => "note:",
            MessageKind::Warning => "warning:",
            MessageKind::Error => "error:",
        };

        if kind == MessageKind::Note {
            println!("{} {}", prefix, args);
        } else {
            eprintln!("{} {}", prefix, args);
        }

        if let Some(e) = err {
            for item in e.iter() {
                eprintln!("caused by: {}", item);
            }
        }
    }

    fn note_highlighted(&mut self, before: &str, highlighted: &str, after: &str) {
        if self.chatter > ChatterLevel::Minimal {
            println!("note: {}{}{}", before, highlighted, after);
        }
    }

    fn dump_error_logs(&mut self, output: &[u8]) {
        eprintln!(
            "==============================================================================="
        );

        io::stderr()
            .write_all(output)
            .expect("write to stderr failed");

        eprintln!(
            "==============================================================================="
        );
    }
}
