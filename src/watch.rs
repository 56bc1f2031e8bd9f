// src/watch.rs -- recompiling when project files change
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! Watch mode: register the project tree with the platform's file-event
//! backend (inotify on Linux, kqueue on the BSDs and macOS, an mtime
//! poller elsewhere), compile, then sleep until something relevant
//! changes. Events are debounced briefly so an editor's save dance turns
//! into one recompile, and the watch set is rebuilt after every compile so
//! files the compile itself created get picked up.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::driver::{run_compile, CompileOptions};
use crate::errors::Result;
use crate::status::StatusBackend;
use crate::{tt_note, tt_warning};

/// File extensions whose changes trigger a recompile.
const TRACKED_EXTENSIONS: &[&str] = &[
    "tex", "bib", "bst", "cls", "sty", "def", "cfg", "clo", "dtx", "fd", "toml",
];

/// Directory names never worth watching.
const EXCLUDED_DIRS: &[&str] = &["target", "node_modules"];

/// How long to keep draining events after the first one arrives.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// How long to block waiting for an event before waking up idle.
const IDLE_WAKE: Duration = Duration::from_secs(60);

fn path_is_relevant(path: &Path) -> bool {
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.starts_with('.') || EXCLUDED_DIRS.contains(&name.as_ref()) {
            return false;
        }
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => TRACKED_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn event_is_relevant(event: &notify::Event, root: &Path) -> bool {
    event.paths.iter().any(|p| {
        let rel = p.strip_prefix(root).unwrap_or(p);
        path_is_relevant(rel)
    })
}

/// Run compile-on-change until interrupted. Never returns except on a
/// setup error; compile failures just wait for the next edit.
pub fn watch_loop(options: CompileOptions, status: &mut dyn StatusBackend) -> Result<()> {
    let root = watch_root(&options)?;

    tt_note!(status, "watching \"{}\" for changes", root.display());

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())
        .map_err(|e| crate::errmsg!("cannot create a file watcher: {}", e))?;

    register(&mut watcher, &root, status);

    run_once(&options, status);

    loop {
        // Block until something happens, waking up periodically so a
        // wedged backend cannot hang us forever.
        let first = match rx.recv_timeout(IDLE_WAKE) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(crate::errmsg!("the file watcher channel closed"));
            }
        };

        let mut relevant = matches!(&first, Ok(e) if event_is_relevant(e, &root));

        // Drain the burst: editors write, rename, and touch in quick
        // succession.
        let deadline = Instant::now() + DEBOUNCE;
        while let Some(left) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) {
            match rx.recv_timeout(left) {
                Ok(Ok(e)) => relevant |= event_is_relevant(&e, &root),
                Ok(Err(_)) => {}
                Err(_) => break,
            }
        }

        if !relevant {
            continue;
        }

        run_once(&options, status);

        // Re-register from scratch: cheaper than diffing the tree, and it
        // picks up files the compile just created.
        let _ = watcher.unwatch(&root);
        register(&mut watcher, &root, status);
    }
}

fn watch_root(options: &CompileOptions) -> Result<PathBuf> {
    let input = &options.input;

    let meta = std::fs::metadata(input)
        .map_err(|_| crate::errmsg!("cannot read input \"{}\"", input.display()))?;

    if meta.is_dir() {
        return Ok(input.clone());
    }

    Ok(input
        .parent()
        .map(Path::to_owned)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn register(watcher: &mut RecommendedWatcher, root: &Path, status: &mut dyn StatusBackend) {
    // A failed registration is never fatal; the poller may still catch up
    // with the file on the next pass.
    if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
        tt_warning!(status, "could not watch \"{}\": {}", root.display(), e);
    }
}

fn run_once(options: &CompileOptions, status: &mut dyn StatusBackend) {
    match run_compile(options.clone(), status) {
        Ok(0) => {}
        Ok(_) => tt_warning!(status, "compile failed; waiting for changes"),
        Err(e) => {
            status.report_error(&e);
            tt_warning!(status, "compile errored; waiting for changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_extensions_are_relevant() {
        assert!(path_is_relevant(Path::new("chapter/intro.tex")));
        assert!(path_is_relevant(Path::new("refs.bib")));
        assert!(path_is_relevant(Path::new("eztex.toml")));
        assert!(!path_is_relevant(Path::new("paper.pdf")));
        assert!(!path_is_relevant(Path::new("notes.md")));
        assert!(!path_is_relevant(Path::new("Makefile")));
    }

    #[test]
    fn hidden_and_excluded_paths_are_ignored() {
        assert!(!path_is_relevant(Path::new(".git/index.tex")));
        assert!(!path_is_relevant(Path::new("target/debug/x.tex")));
        assert!(!path_is_relevant(Path::new("node_modules/a/b.tex")));
        assert!(!path_is_relevant(Path::new(".hidden.tex")));
    }
}
