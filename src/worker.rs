// src/worker.rs -- the browser worker protocol and boot pipeline
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! The protocol spoken between the browser UI and the compile worker, and
//! the worker-side pipeline state. The worker owns two uses of the engine
//! module: a long-lived "API" instance answering metadata queries, and a
//! fresh instance per compile. Everything here is plain data so the native
//! build can test it; the wasm exports live in `host::browser`.

use serde::{Deserialize, Serialize};

use crate::digest::DigestData;

/// Stamp identifying the persistent-cache generation. Any mismatch between
/// this and the stamp recorded in the browser cache's metadata invalidates
/// the whole cache before a single seed entry is loaded.
pub fn cache_version_stamp(bundle_digest: &DigestData) -> String {
    format!("v2-{}", bundle_digest.hex_prefix(16))
}

/// The classifier class attached to worker log lines.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogClass {
    LogInfo,
    LogWarn,
    LogError,
    LogDebug,
}

/// A structured diagnostic forwarded to the UI.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WorkerDiagnostic {
    pub severity: LogClass,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

/// One user file shipped into the compile's filesystem view.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WorkerFile {
    pub name: String,
    #[serde(with = "serde_bytes_base64")]
    pub data: Vec<u8>,
}

/// Requests from the UI to the worker.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiRequest {
    Init,
    Compile {
        files: Vec<WorkerFile>,
        #[serde(skip_serializing_if = "Option::is_none")]
        main: Option<String>,
    },
    ClearCache,
}

/// Messages from the worker back to the UI.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    Status {
        msg: String,
        class: LogClass,
    },
    Progress {
        pct: u8,
    },
    Log {
        msg: String,
        class: LogClass,
    },
    Diagnostic {
        diag: WorkerDiagnostic,
    },
    CacheStatus {
        status: String,
        detail: String,
    },
    Ready,
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_bytes_base64")]
        pdf: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_bytes_base64")]
        synctex: Option<Vec<u8>>,
        elapsed_ms: u64,
    },
}

/// Classify one line of engine stderr into a worker diagnostic, preferring
/// the structured `file:line:` prefix over the substring heuristic, and
/// always retaining the raw line for the log stream.
pub fn classify_engine_line(line: &str) -> WorkerDiagnostic {
    let diag = crate::status::Diagnostic::from_engine_line(line);

    let severity = if diag.is_error() {
        LogClass::LogError
    } else if line.contains("warning") || line.contains("Warning") {
        LogClass::LogWarn
    } else {
        LogClass::LogInfo
    };

    let (file, line_no) = match diag.location() {
        Some((f, l)) => (Some(f.to_owned()), Some(l)),
        None => (None, None),
    };

    WorkerDiagnostic {
        severity,
        message: diag.message().to_owned(),
        file,
        line: line_no,
        context: Vec::new(),
    }
}

/// The record kept at the root of the browser cache.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CacheMetadata {
    pub version: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub cached_at: u64,
}

impl CacheMetadata {
    /// Whether a cache carrying this record can be reused for the bundle
    /// identified by `digest`.
    pub fn is_valid_for(&self, digest: &DigestData) -> bool {
        self.version == cache_version_stamp(digest)
    }
}

/// The stages of the worker's boot pipeline, in order. The module compile
/// and the index fetch start in parallel; everything else is sequential.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum BootPhase {
    CompilingModule,
    FetchingIndex,
    SeedingCache,
    GeneratingFormat,
    Ready,
}

impl BootPhase {
    pub fn status_line(self) -> &'static str {
        match self {
            BootPhase::CompilingModule => "Loading WASM",
            BootPhase::FetchingIndex => "Loading index",
            BootPhase::SeedingCache => "Preparing file cache",
            BootPhase::GeneratingFormat => "Generating format",
            BootPhase::Ready => "Ready",
        }
    }

    pub fn next(self) -> Option<BootPhase> {
        match self {
            BootPhase::CompilingModule => Some(BootPhase::FetchingIndex),
            BootPhase::FetchingIndex => Some(BootPhase::SeedingCache),
            BootPhase::SeedingCache => Some(BootPhase::GeneratingFormat),
            BootPhase::GeneratingFormat => Some(BootPhase::Ready),
            BootPhase::Ready => None,
        }
    }
}

/// The argument vectors the worker passes to its per-task module
/// instances.
pub fn compile_argv(main_file: &str) -> Vec<String> {
    vec!["eztex".to_owned(), "compile".to_owned(), main_file.to_owned()]
}

pub fn generate_format_argv() -> Vec<String> {
    vec!["eztex".to_owned(), "generate-format".to_owned()]
}

// Base64 payloads keep the JSON protocol transferable through
// `postMessage` paths that stringify.
mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(de)?;
        STANDARD
            .decode(&text)
            .map_err(|_| serde::de::Error::custom("invalid base64 payload"))
    }
}

mod opt_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(d) => ser.serialize_some(&STANDARD.encode(d)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(de)?;
        match text {
            Some(t) => STANDARD
                .decode(&t)
                .map(Some)
                .map_err(|_| serde::de::Error::custom("invalid base64 payload")),
            None => Ok(None),
        }
    }
}
