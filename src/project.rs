// src/project.rs -- resolving what the user asked us to compile
// Copyright 2019-2020 the Tectonic Project
// Licensed under the MIT License.

//! The compile argument can be a plain `.tex` file, a project directory,
//! or a `.zip` archive of one. This module dispatches the three cases and
//! picks the main file out of multi-file projects.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::status::StatusBackend;
use crate::tt_note;

/// Basenames that conventionally mark a project's main file, most
/// conventional first.
const WELL_KNOWN_MAIN_NAMES: &[&str] = &[
    "main.tex",
    "index.tex",
    "thesis.tex",
    "paper.tex",
    "document.tex",
    "report.tex",
];

/// How much of a candidate file the `\documentclass` sniff reads.
const SNIFF_LEN: usize = 4096;

/// The resolved compile input. When the input came from a zip archive,
/// `_temp_dir` owns the extraction directory and removes it when the
/// compile is over.
pub struct ProjectInput {
    pub tex_file: PathBuf,
    pub project_dir: Option<PathBuf>,
    _temp_dir: Option<tempfile::TempDir>,
}

impl ProjectInput {
    /// A plain single-file input with no surrounding project.
    pub fn from_file(path: &Path) -> ProjectInput {
        ProjectInput {
            tex_file: path.to_owned(),
            project_dir: None,
            _temp_dir: None,
        }
    }

    /// Whether the input lives in an extraction directory that is deleted
    /// when this value drops.
    pub fn is_ephemeral(&self) -> bool {
        self._temp_dir.is_some()
    }

    /// Dispatch on the CLI argument: file, directory, or zip.
    pub fn resolve(arg: &Path, status: &mut dyn StatusBackend) -> Result<ProjectInput> {
        let meta = fs::metadata(arg)
            .map_err(|_| crate::errmsg!("cannot read input \"{}\"", arg.display()))?;

        if meta.is_dir() {
            return Self::from_directory(arg, status);
        }

        if arg.extension().map(|e| e == "zip").unwrap_or(false) {
            return Self::from_zip(arg, status);
        }

        Ok(ProjectInput {
            tex_file: arg.to_owned(),
            project_dir: None,
            _temp_dir: None,
        })
    }

    fn from_directory(dir: &Path, status: &mut dyn StatusBackend) -> Result<ProjectInput> {
        let names = list_relative_files(dir)?;

        let main = detect_main_with_fs(dir, &names).ok_or_else(|| {
            crate::errmsg!("no main .tex file found in \"{}\"", dir.display())
        })?;

        tt_note!(status, "using \"{}\" as the main file", main);

        Ok(ProjectInput {
            tex_file: dir.join(main),
            project_dir: Some(dir.to_owned()),
            _temp_dir: None,
        })
    }

    fn from_zip(archive_path: &Path, status: &mut dyn StatusBackend) -> Result<ProjectInput> {
        let temp_dir = tempfile::Builder::new().prefix("eztex-zip").tempdir()?;

        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(temp_dir.path())?;

        let names = list_relative_files(temp_dir.path())?;

        let main = detect_main_with_fs(temp_dir.path(), &names).ok_or_else(|| {
            crate::errmsg!(
                "no main .tex file found in archive \"{}\"",
                archive_path.display()
            )
        })?;

        tt_note!(status, "using \"{}\" as the main file", main);

        Ok(ProjectInput {
            tex_file: temp_dir.path().join(&main),
            project_dir: Some(temp_dir.path().to_owned()),
            _temp_dir: Some(temp_dir),
        })
    }
}

/// Enumerate a directory tree as `/`-separated relative names.
fn list_relative_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_owned(),
            None => continue,
        };

        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }

    Ok(())
}

fn detect_main_with_fs(root: &Path, names: &[String]) -> Option<String> {
    let root = root.to_owned();
    let mut reader = move |name: &str| -> Option<Vec<u8>> {
        let mut f = File::open(root.join(name)).ok()?;
        let mut buf = vec![0u8; SNIFF_LEN];
        let n = f.read(&mut buf).ok()?;
        buf.truncate(n);
        Some(buf)
    };

    detect_main_file(names, Some(&mut reader))
}

/// Choose the main `.tex` file out of a project's file list.
///
/// The heuristics, first hit wins: a lone root-level `.tex`; the lone
/// candidate containing `\documentclass` in its head (with ties broken by
/// the well-known names, restricted to the matching candidates); the
/// well-known names; the alphabetically first root-level `.tex`. Returns
/// `None` when there is no root-level `.tex` at all.
pub fn detect_main_file(
    names: &[String],
    reader: Option<&mut dyn FnMut(&str) -> Option<Vec<u8>>>,
) -> Option<String> {
    let mut candidates: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|n| !n.contains('/') && !n.contains('\\') && n.ends_with(".tex"))
        .collect();
    candidates.sort_unstable();

    if candidates.is_empty() {
        return None;
    }

    if candidates.len() == 1 {
        return Some(candidates[0].to_owned());
    }

    if let Some(read) = reader {
        let with_documentclass: Vec<&str> = candidates
            .iter()
            .copied()
            .filter(|name| {
                read(name)
                    .map(|head| contains_documentclass(&head))
                    .unwrap_or(false)
            })
            .collect();

        match with_documentclass.len() {
            1 => return Some(with_documentclass[0].to_owned()),
            0 => {}
            _ => {
                // Several plausible mains; let the conventional names pick
                // among those that actually look like documents.
                for known in WELL_KNOWN_MAIN_NAMES {
                    if with_documentclass.contains(known) {
                        return Some((*known).to_owned());
                    }
                }
            }
        }
    }

    for known in WELL_KNOWN_MAIN_NAMES {
        if candidates.contains(known) {
            return Some((*known).to_owned());
        }
    }

    Some(candidates[0].to_owned())
}

fn contains_documentclass(head: &[u8]) -> bool {
    head.windows(b"\\documentclass".len())
        .any(|w| w == b"\\documentclass")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NoopStatusBackend;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn lone_root_tex_wins() {
        let got = detect_main_file(&names(&["notes.md", "intro.tex", "figs/a.tex"]), None);
        assert_eq!(got.as_deref(), Some("intro.tex"));
    }

    #[test]
    fn no_root_tex_yields_none() {
        assert_eq!(detect_main_file(&names(&["sub/x.tex", "readme.md"]), None), None);
    }

    #[test]
    fn documentclass_scan_breaks_ties() {
        let list = names(&["aaa.tex", "zzz.tex"]);
        let mut reader = |name: &str| -> Option<Vec<u8>> {
            Some(if name == "zzz.tex" {
                b"\\documentclass{article}".to_vec()
            } else {
                b"% just a fragment".to_vec()
            })
        };

        let got = detect_main_file(&list, Some(&mut reader));
        assert_eq!(got.as_deref(), Some("zzz.tex"));
    }

    #[test]
    fn multiple_documentclass_prefers_known_names_among_matches() {
        let list = names(&["chapter.tex", "main.tex", "paper.tex"]);
        let mut reader = |name: &str| -> Option<Vec<u8>> {
            Some(if name == "chapter.tex" || name == "paper.tex" {
                b"\\documentclass{book}".to_vec()
            } else {
                b"% main is just an include driver here".to_vec()
            })
        };

        // main.tex is better-known, but it has no \documentclass; the
        // known-name pass is restricted to the matching files.
        let got = detect_main_file(&list, Some(&mut reader));
        assert_eq!(got.as_deref(), Some("paper.tex"));
    }

    #[test]
    fn well_known_names_without_reader() {
        let got = detect_main_file(&names(&["appendix.tex", "thesis.tex", "zeta.tex"]), None);
        assert_eq!(got.as_deref(), Some("thesis.tex"));
    }

    #[test]
    fn alphabetical_fallback() {
        let got = detect_main_file(&names(&["beta.tex", "alpha.tex", "gamma.tex"]), None);
        assert_eq!(got.as_deref(), Some("alpha.tex"));
    }

    #[test]
    fn resolve_plain_file_passes_through() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.tex");
        fs::write(&file, "\\documentclass{article}").unwrap();

        let mut status = NoopStatusBackend::new();
        let input = ProjectInput::resolve(&file, &mut status).unwrap();
        assert_eq!(input.tex_file, file);
        assert!(input.project_dir.is_none());
    }

    #[test]
    fn resolve_directory_detects_main() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.tex"), "\\documentclass{article}").unwrap();
        fs::write(dir.path().join("chapter1.tex"), "\\section{One}").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let mut status = NoopStatusBackend::new();
        let input = ProjectInput::resolve(dir.path(), &mut status).unwrap();
        assert_eq!(input.tex_file, dir.path().join("main.tex"));
        assert_eq!(input.project_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn resolve_directory_without_tex_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.md"), "nothing to compile").unwrap();

        let mut status = NoopStatusBackend::new();
        assert!(ProjectInput::resolve(dir.path(), &mut status).is_err());
    }

    #[test]
    fn resolve_zip_extracts_and_detects() {
        use std::io::Write;
        use zip::write::FileOptions;

        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("project.zip");

        {
            let file = File::create(&zip_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            writer
                .start_file("paper.tex", FileOptions::default())
                .unwrap();
            writer
                .write_all(b"\\documentclass{article}\\begin{document}x\\end{document}")
                .unwrap();
            writer
                .start_file("refs.bib", FileOptions::default())
                .unwrap();
            writer.write_all(b"@misc{x, title={X}}").unwrap();
            writer.finish().unwrap();
        }

        let mut status = NoopStatusBackend::new();
        let input = ProjectInput::resolve(&zip_path, &mut status).unwrap();

        assert!(input.tex_file.ends_with("paper.tex"));
        assert!(input.tex_file.exists());
        assert!(input.project_dir.is_some());

        let extracted_root = input.project_dir.clone().unwrap();
        drop(input);
        // extraction directory is removed with the input
        assert!(!extracted_root.exists());
    }
}
