// src/status/mod.rs -- communicating status updates to the user
// Copyright 2017-2020 the Tectonic Project
// Licensed under the MIT License.

//! The leveled, scoped reporting channel. On the command line messages land
//! on stdout/stderr (optionally colorized); in the browser worker the same
//! events become structured messages posted to the owning thread.

pub mod plain;
pub mod termcolor;

use std::fmt::Arguments;
use std::str::FromStr;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    Note,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum ChatterLevel {
    Minimal,
    Normal,
}

impl FromStr for ChatterLevel {
    type Err = &'static str;

    fn from_str(a_str: &str) -> std::result::Result<Self, Self::Err> {
        match a_str {
            "default" | "normal" => Ok(ChatterLevel::Normal),
            "minimal" => Ok(ChatterLevel::Minimal),
            _ => Err("unsupported or unknown chatter level"),
        }
    }
}

/// A trait for types that can serve as the message sink of a compile. The
/// three severities correspond to the `on_info` / `on_warning` / `on_error`
/// callbacks that the surrounding system installs around the engine.
pub trait StatusBackend {
    /// Report a message to the status backend, possibly including a
    /// chained error that caused it.
    fn report(&mut self, kind: MessageKind, args: Arguments, err: Option<&Error>);

    /// Report an error to the status backend, unwinding its chain of causes.
    fn report_error(&mut self, err: &Error) {
        let mut prefix = "error";
        for item in err.iter() {
            self.report(MessageKind::Error, format_args!("{}: {}", prefix, item), None);
            prefix = "caused by";
        }
    }

    /// Render an engine diagnostic: a colored severity label, an arrow line
    /// pointing at `file:line` when the message carried one, and
    /// pipe-indented context lines.
    fn report_diagnostic(&mut self, diag: &Diagnostic) {
        let kind = if diag.is_error() {
            MessageKind::Error
        } else {
            MessageKind::Warning
        };

        match diag.location() {
            Some((file, line)) => {
                self.report(kind, format_args!("{}", diag.message()), None);
                self.report(kind, format_args!(" --> {}:{}", file, line), None);
            }
            None => {
                self.report(kind, format_args!("{}", diag.message()), None);
            }
        }

        for ctx in diag.context() {
            self.report(kind, format_args!("  | {}", ctx), None);
        }
    }

    /// Issue a note-level status, with a bit of the message highlighted.
    fn note_highlighted(&mut self, before: &str, highlighted: &str, after: &str);

    /// Dump a chunk of the engine's raw output (e.g., its log file) after
    /// something went wrong inside it.
    fn dump_error_logs(&mut self, output: &[u8]);
}

/// Report a formatted informational message to the status backend.
#[macro_export]
macro_rules! tt_note {
    ($dest:expr, $( $fmt_args:expr ),*) => {
        $dest.report($crate::status::MessageKind::Note, format_args!($( $fmt_args ),*), None)
    };
    ($dest:expr, $( $fmt_args:expr ),* ; $err:expr) => {
        $dest.report($crate::status::MessageKind::Note, format_args!($( $fmt_args ),*), Some(&$err))
    };
}

/// Report a formatted warning to the status backend.
#[macro_export]
macro_rules! tt_warning {
    ($dest:expr, $( $fmt_args:expr ),*) => {
        $dest.report($crate::status::MessageKind::Warning, format_args!($( $fmt_args ),*), None)
    };
    ($dest:expr, $( $fmt_args:expr ),* ; $err:expr) => {
        $dest.report($crate::status::MessageKind::Warning, format_args!($( $fmt_args ),*), Some(&$err))
    };
}

/// Report a formatted error to the status backend.
#[macro_export]
macro_rules! tt_error {
    ($dest:expr, $( $fmt_args:expr ),*) => {
        $dest.report($crate::status::MessageKind::Error, format_args!($( $fmt_args ),*), None)
    };
    ($dest:expr, $( $fmt_args:expr ),* ; $err:expr) => {
        $dest.report($crate::status::MessageKind::Error, format_args!($( $fmt_args ),*), Some(&$err))
    };
}

/// A backend that swallows everything. Handy in tests and in the inner
/// engine run of format generation, where the outer driver already narrates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStatusBackend {}

impl NoopStatusBackend {
    pub fn new() -> NoopStatusBackend {
        Default::default()
    }
}

impl StatusBackend for NoopStatusBackend {
    fn report(&mut self, _kind: MessageKind, _args: Arguments, _err: Option<&Error>) {}
    fn note_highlighted(&mut self, _before: &str, _highlighted: &str, _after: &str) {}
    fn dump_error_logs(&mut self, _output: &[u8]) {}
}

/// A diagnostic being accumulated by the engine. The engine builds one of
/// these up over several appends (its messages arrive in chunks) and the
/// surrounding system emits it once, on finish.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    buffer: String,
    is_error: bool,
}

impl Diagnostic {
    pub fn new_warning() -> Diagnostic {
        Diagnostic {
            buffer: String::new(),
            is_error: false,
        }
    }

    pub fn new_error() -> Diagnostic {
        Diagnostic {
            buffer: String::new(),
            is_error: true,
        }
    }

    /// Build a diagnostic directly from one line of engine stderr,
    /// classifying its severity by the case-sensitive substrings the engine
    /// is known to emit. The `file:line:` prefix parser is authoritative
    /// when the line carries one.
    pub fn from_engine_line(line: &str) -> Diagnostic {
        let is_error = line.contains("error") || line.contains("Error");
        let is_warning = !is_error && (line.contains("warning") || line.contains("Warning"));

        let mut d = if is_error {
            Diagnostic::new_error()
        } else if is_warning {
            Diagnostic::new_warning()
        } else {
            // Plain chatter still flows through the diagnostic channel so
            // the raw line is always available for copy/paste.
            Diagnostic {
                buffer: String::new(),
                is_error: false,
            }
        };

        d.append(line);
        d
    }

    pub fn append(&mut self, chunk: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(chunk);
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// The first line of the accumulated text, with any `file:line: ` prefix
    /// stripped.
    pub fn message(&self) -> &str {
        let first = self.buffer.lines().next().unwrap_or("");
        match parse_location_prefix(first) {
            Some((_, _, rest)) => rest,
            None => first,
        }
    }

    /// The `(path, line)` pair parsed out of a `path:line: message` prefix,
    /// if the first line carries one.
    pub fn location(&self) -> Option<(&str, u32)> {
        let first = self.buffer.lines().next()?;
        parse_location_prefix(first).map(|(p, l, _)| (p, l))
    }

    /// Every line after the first: the engine's context lines.
    pub fn context(&self) -> impl Iterator<Item = &str> {
        self.buffer.lines().skip(1)
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Emit the accumulated diagnostic into a status backend and consume it.
    pub fn finish(self, status: &mut dyn StatusBackend) {
        status.report_diagnostic(&self);
    }
}

/// Parse the `<path>:<line>: <message>` prefix the engine uses for located
/// diagnostics. The path must be non-numeric, the line purely digits, and
/// the required separator is exactly `": "`.
pub fn parse_location_prefix(line: &str) -> Option<(&str, u32, &str)> {
    let sep = line.find(": ")?;
    let (head, rest) = line.split_at(sep);
    let rest = &rest[2..];

    let colon = head.rfind(':')?;
    let (path, line_digits) = head.split_at(colon);
    let line_digits = &line_digits[1..];

    if path.is_empty() || path.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if line_digits.is_empty() || !line_digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let line_no = line_digits.parse().ok()?;
    Some((path, line_no, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_prefix_happy_path() {
        let got = parse_location_prefix("paper.tex:12: Undefined control sequence");
        assert_eq!(got, Some(("paper.tex", 12, "Undefined control sequence")));
    }

    #[test]
    fn location_prefix_rejects_numeric_path() {
        assert_eq!(parse_location_prefix("123:45: nope"), None);
    }

    #[test]
    fn location_prefix_requires_colon_space() {
        assert_eq!(parse_location_prefix("paper.tex:12:squeezed"), None);
        assert_eq!(parse_location_prefix("no separator here"), None);
    }

    #[test]
    fn location_prefix_requires_digit_line() {
        assert_eq!(parse_location_prefix("paper.tex:twelve: hmm"), None);
    }

    #[test]
    fn classify_by_substring() {
        assert!(Diagnostic::from_engine_line("! LaTeX Error: missing file").is_error());
        assert!(!Diagnostic::from_engine_line("Overfull warning on line 3").is_error());
        assert!(!Diagnostic::from_engine_line("This is XeTeX").is_error());
    }

    #[test]
    fn diagnostic_accumulates_context() {
        let mut d = Diagnostic::new_error();
        d.append("paper.tex:3: Undefined control sequence");
        d.append("l.3 \\badmacro");
        d.append("       ^");
        assert_eq!(d.location(), Some(("paper.tex", 3)));
        assert_eq!(d.message(), "Undefined control sequence");
        assert_eq!(d.context().count(), 2);
    }
}
