// src/driver.rs -- the multi-pass compile driver
// Copyright 2018-2020 the Tectonic Project
// Licensed under the MIT License.

//! Orchestration of a complete compile: resolve the project input,
//! configure the world and its bundle store, make sure a format preload
//! exists, run engine passes until the auxiliary file reaches a fixed
//! point, run the bibliography pass when the first `.aux` calls for one,
//! convert the XDV, and put the artifacts where they belong.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::bundle::{ranges, seed, BundleStore};
use crate::config::{self, BundleEndpoints, ProjectConfig};
use crate::engines::{self, BibtexEngine, TexEngine, XdvipdfmxEngine};
use crate::errors::Result;
use crate::format_cache::{format_cache_key, FormatCache, FormatKind};
use crate::project::ProjectInput;
use crate::status::{Diagnostic, StatusBackend};
use crate::world::World;
use crate::{tt_error, tt_note, tt_warning};

#[cfg(not(target_arch = "wasm32"))]
use crate::host::native::NativeHost;

/// The pass loop gives up on reaching an auxiliary fixed point after this
/// many engine runs.
pub const MAX_PASSES: usize = 5;

/// Job outputs deleted after a successful compile, by extension.
pub const INTERMEDIATE_EXTENSIONS: &[&str] = &[
    "aux", "log", "xdv", "lof", "lot", "out", "toc", "bbl", "blg", "nav", "snm", "vrb",
];

/// First-pass auxiliary content that means a bibliography tool must run.
const BIB_MARKERS: &[&[u8]] = &[b"\\bibdata{", b"\\bibstyle{", b"\\abx@aux@"];

/// Everything a compile needs to know, after the CLI and the project file
/// have been merged.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// `None` means "not chosen on the command line": the project file may
    /// still pick, and LaTeX is the final default.
    pub format: Option<FormatKind>,
    pub synctex: bool,
    pub deterministic: bool,
    pub keep_intermediates: bool,
    pub cache_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl CompileOptions {
    pub fn new(input: PathBuf) -> CompileOptions {
        CompileOptions {
            input,
            output: None,
            format: None,
            synctex: false,
            deterministic: false,
            keep_intermediates: false,
            cache_dir: None,
            verbose: false,
        }
    }

    /// Fill unset options from the project file. Flags the user passed on
    /// the command line always win; this only adds what is still missing.
    pub fn apply_config(&mut self, config: &ProjectConfig) {
        if self.output.is_none() {
            self.output = config.output.as_ref().map(PathBuf::from);
        }

        if self.format.is_none() {
            self.format = config.format_kind();
        }

        if !self.synctex {
            self.synctex = config.synctex.unwrap_or(false);
        }

        if !self.deterministic {
            self.deterministic = config.deterministic.unwrap_or(false);
        }

        if !self.keep_intermediates {
            self.keep_intermediates = config.keep_intermediates.unwrap_or(false);
        }
    }

    /// The date the engine sees. Deterministic builds pin the epoch;
    /// otherwise `SOURCE_DATE_EPOCH` is honored, then the clock.
    pub fn build_date(&self) -> SystemTime {
        if self.deterministic {
            return SystemTime::UNIX_EPOCH;
        }

        if let Ok(s) = env::var("SOURCE_DATE_EPOCH") {
            if let Ok(epoch) = s.parse::<u64>() {
                if let Some(t) =
                    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(epoch))
                {
                    return t;
                }
            }
        }

        SystemTime::now()
    }
}

/// Whether the first-pass auxiliary file asks for a bibliography run.
pub fn aux_wants_bibtex(aux: &[u8]) -> bool {
    BIB_MARKERS
        .iter()
        .any(|marker| aux.windows(marker.len()).any(|w| w == *marker))
}

/// The job's intermediate files, whether or not they exist yet.
pub fn intermediate_paths(work_dir: &Path, jobname: &str) -> Vec<PathBuf> {
    INTERMEDIATE_EXTENSIONS
        .iter()
        .map(|ext| work_dir.join(format!("{}.{}", jobname, ext)))
        .collect()
}

/// Rename that degrades to copy-and-delete across filesystems, which
/// matters when moving artifacts out of a temp extraction directory.
#[cfg(not(target_arch = "wasm32"))]
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub struct CompileSession {
    options: CompileOptions,
    project: ProjectInput,
    world: World,
    format_cache: FormatCache,
    endpoints: BundleEndpoints,
    format: FormatKind,
    jobname: String,
    work_dir: PathBuf,
    build_date: SystemTime,
}

#[cfg(not(target_arch = "wasm32"))]
impl CompileSession {
    pub fn new(
        mut options: CompileOptions,
        status: &mut dyn StatusBackend,
    ) -> Result<CompileSession> {
        let project = ProjectInput::resolve(&options.input, status)?;

        let work_dir = project
            .tex_file
            .parent()
            .map(Path::to_owned)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = ProjectConfig::load_for(
            project.project_dir.as_deref().unwrap_or(&work_dir),
        );

        if let Some(c) = &config {
            options.apply_config(c);
        }

        let format = options.format.unwrap_or(FormatKind::Latex);

        let endpoints = BundleEndpoints::resolve(config.as_ref());
        let cache_root = config::cache_root(options.cache_dir.as_deref())?;
        let host = NativeHost::new(&cache_root, &endpoints)?;
        let format_cache = FormatCache::new(host.formats_dir());

        let jobname = project
            .tex_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| {
                crate::errmsg!(
                    "cannot derive a job name from \"{}\"",
                    project.tex_file.display()
                )
            })?;

        let mut world = World::new();
        world.set_primary_input(&project.tex_file);
        world.set_output_dir(&work_dir);
        world.add_search_dir(&work_dir)?;

        if let Some(dir) = &project.project_dir {
            if dir != &work_dir {
                world.add_search_dir(dir)?;
            }
        }

        world.attach_bundle(BundleStore::new(Box::new(host)));

        let build_date = options.build_date();

        Ok(CompileSession {
            options,
            project,
            world,
            format_cache,
            endpoints,
            format,
            jobname,
            work_dir,
            build_date,
        })
    }

    /// Run the compile to completion. The result is the process exit code:
    /// 0 on success, 1 on any failure.
    pub fn run(&mut self, status: &mut dyn StatusBackend) -> Result<i32> {
        let started = self.timestamp_ns();

        engines::install_checkpoint_callback();

        self.seed_init_files(status);

        self.ensure_format(status)?;

        if !self.pass_loop(status)? {
            return Ok(1);
        }

        if !self.xdv_to_pdf(status)? {
            return Ok(1);
        }

        let pdf_path = self.finalize_outputs(status)?;

        if !self.options.keep_intermediates {
            self.cleanup_intermediates();
        }

        match pdf_path {
            Some(path) => {
                let elapsed_ms = (self.timestamp_ns() - started) / 1_000_000;
                status.note_highlighted(
                    "wrote ",
                    &path.display().to_string(),
                    &format!(" in {} ms", elapsed_ms),
                );
                Ok(0)
            }
            None => {
                tt_warning!(status, "the compile succeeded but produced no PDF");
                Ok(1)
            }
        }
    }

    fn timestamp_ns(&mut self) -> i128 {
        self.world
            .bundle_mut()
            .map(|b| b.timestamp_ns())
            .unwrap_or(0)
    }

    /// Prefetch the baked-in set of files every compile touches, so the
    /// engine does not stall on them one at a time mid-pass. Seeding
    /// failures only warn: a warm cache can still carry the compile.
    fn seed_init_files(&mut self, status: &mut dyn StatusBackend) {
        let names: Vec<&str> = seed::init_files().collect();

        if let Some(store) = self.world.bundle_mut() {
            if let Err(e) = store.seed(&names, ranges::DEFAULT_CONCURRENCY, status) {
                tt_warning!(status, "could not seed the file cache"; e);
            }
        }
    }

    /// Make sure the format preload is in memory: use the blob if one is
    /// already attached, load it from the format cache, or generate it
    /// with an initex sub-run.
    fn ensure_format(&mut self, status: &mut dyn StatusBackend) -> Result<()> {
        if self.world.format_data().is_some() {
            return Ok(());
        }

        let kind = self.format;
        let key = format_cache_key(&self.endpoints.digest, engines::ENGINE_VERSION, kind);

        if let Some(blob) = self.format_cache.load(&key) {
            self.world.set_format_data(blob, &kind.dump_file_name());
            return Ok(());
        }

        // Seed the initex dependency set first so generation is not
        // interleaved with one-at-a-time fetches.
        let names: Vec<&str> = seed::format_files().collect();
        if let Some(store) = self.world.bundle_mut() {
            if let Err(e) = store.seed(&names, ranges::DEFAULT_CONCURRENCY, status) {
                tt_warning!(status, "could not seed the format dependency set"; e);
            }
        }

        let blob = self.generate_format(kind, status)?;
        self.format_cache.store(&key, &blob)?;
        self.world.set_format_data(blob, &kind.dump_file_name());
        Ok(())
    }

    /// The initex sub-run: write a stub that inputs the format's bootstrap
    /// file, dump the engine state, and capture the blob. The engine names
    /// its dump after the stub's stem, so the result is renamed to the
    /// canonical format name before it is read back.
    fn generate_format(
        &mut self,
        kind: FormatKind,
        status: &mut dyn StatusBackend,
    ) -> Result<Vec<u8>> {
        status.note_highlighted(
            "generating format ",
            kind.dump_name(),
            " (this only happens on the first run)",
        );

        let stub_stem = format!("eztex-fmtgen-{}", kind.dump_name());
        let stub_path = self.work_dir.join(format!("{}.tex", stub_stem));
        fs::write(&stub_path, kind.initex_stub())?;

        self.world.reset_io()?;

        let result = TexEngine::new()
            .initex_mode(true)
            .halt_on_error_mode(true)
            .build_date(self.build_date)
            .process(kind.dump_name(), &stub_path.to_string_lossy());

        let _ = fs::remove_file(&stub_path);

        match result {
            Ok(outcome) if outcome.is_success() => {}
            Ok(_) => {
                self.emit_engine_error(status);
                return Err(crate::errmsg!("format generation failed"));
            }
            Err(e) => return Err(e),
        }

        let derived = self.work_dir.join(format!("{}.fmt", stub_stem));
        let canonical = self.work_dir.join(kind.dump_file_name());
        move_file(&derived, &canonical)?;

        let blob = fs::read(&canonical)?;
        let _ = fs::remove_file(&canonical);

        if blob.is_empty() {
            return Err(crate::errmsg!("the engine produced an empty format file"));
        }

        Ok(blob)
    }

    /// Run engine passes until the `.aux` stops changing, the first pass
    /// produces no `.aux` at all, or the pass cap is reached. Returns
    /// whether the loop finished without an engine failure.
    fn pass_loop(&mut self, status: &mut dyn StatusBackend) -> Result<bool> {
        let aux_path = self.work_dir.join(format!("{}.aux", self.jobname));
        let input_name = self.project.tex_file.to_string_lossy().into_owned();
        let dump_name = self.format.dump_name().to_owned();

        let mut stashed_aux: Option<Vec<u8>> = None;
        let mut bibtex_ran = false;

        for pass in 1..=MAX_PASSES {
            self.world.reset_io()?;

            if self.options.verbose {
                tt_note!(status, "pass {} of at most {}", pass, MAX_PASSES);
            }
            status.note_highlighted("running ", "XeTeX", &format!(" (pass {})", pass));

            let outcome = match TexEngine::new()
                .halt_on_error_mode(true)
                .synctex(self.options.synctex)
                .build_date(self.build_date)
                .process(&dump_name, &input_name)
            {
                Ok(o) => o,
                Err(e) => {
                    status.report_error(&e);
                    return Ok(false);
                }
            };

            if !outcome.is_success() {
                self.emit_engine_error(status);
                return Ok(false);
            }

            let aux = match fs::read(&aux_path) {
                Ok(bytes) => bytes,
                // No auxiliary file: nothing iterates, one pass is enough.
                Err(_) => return Ok(true),
            };

            if pass == 1 {
                if aux_wants_bibtex(&aux) && !bibtex_ran {
                    bibtex_ran = true;
                    self.run_bibtex(&aux_path, status);
                }
                stashed_aux = Some(aux);
            } else {
                if stashed_aux.as_deref() == Some(aux.as_slice()) {
                    // Fixed point: another pass would reproduce this aux
                    // byte for byte.
                    return Ok(true);
                }
                stashed_aux = Some(aux);
            }
        }

        tt_warning!(
            status,
            "the auxiliary file did not stabilize after {} passes; output may have stale references",
            MAX_PASSES
        );
        Ok(true)
    }

    /// One bibliography run per compile. Failure demotes to a warning.
    fn run_bibtex(&mut self, aux_path: &Path, status: &mut dyn StatusBackend) {
        status.note_highlighted("running ", "BibTeX", "");

        if self.world.reset_io().is_err() {
            return;
        }

        match BibtexEngine::new().process(&aux_path.to_string_lossy()) {
            Ok(crate::engines::BibtexOutcome::Spotless) => {}
            Ok(crate::engines::BibtexOutcome::Warnings) => {
                tt_warning!(status, "the bibliography pass reported problems; continuing");
            }
            Err(e) => {
                tt_warning!(status, "the bibliography pass failed; continuing"; e);
            }
        }
    }

    fn xdv_to_pdf(&mut self, status: &mut dyn StatusBackend) -> Result<bool> {
        let xdv = self.work_dir.join(format!("{}.xdv", self.jobname));
        let pdf = self.work_dir.join(format!("{}.pdf", self.jobname));

        if !xdv.exists() {
            tt_warning!(status, "the engine produced no XDV output");
            return Ok(false);
        }

        status.note_highlighted("running ", "xdvipdfmx", "");

        self.world.reset_io()?;

        let result = XdvipdfmxEngine::new()
            .deterministic_tags(self.options.deterministic)
            .build_date(self.build_date)
            .process(&xdv.to_string_lossy(), &pdf.to_string_lossy());

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                status.report_error(&e);
                Ok(false)
            }
        }
    }

    /// Put the PDF (and the synctex sidecar, when enabled) where it
    /// belongs: an explicit `--output` path wins; a zip job leaves its
    /// artifacts in the invoking directory, because the extraction
    /// directory is about to vanish; otherwise they stay beside the input.
    fn finalize_outputs(&mut self, status: &mut dyn StatusBackend) -> Result<Option<PathBuf>> {
        let produced_pdf = self.work_dir.join(format!("{}.pdf", self.jobname));

        if !produced_pdf.exists() {
            return Ok(None);
        }

        let final_pdf = match (&self.options.output, self.project.is_ephemeral()) {
            (Some(explicit), _) => explicit.clone(),
            (None, true) => env::current_dir()?.join(format!("{}.pdf", self.jobname)),
            (None, false) => produced_pdf.clone(),
        };

        if final_pdf != produced_pdf {
            if let Some(parent) = final_pdf.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            move_file(&produced_pdf, &final_pdf)?;
        }

        if self.options.synctex {
            let produced = self
                .work_dir
                .join(format!("{}.synctex.gz", self.jobname));
            if produced.exists() {
                let target = final_pdf
                    .with_file_name(format!("{}.synctex.gz", self.jobname));
                if target != produced {
                    if let Err(e) = move_file(&produced, &target) {
                        tt_warning!(status, "could not move the synctex file"; e);
                    }
                }
            }
        }

        Ok(Some(final_pdf))
    }

    fn cleanup_intermediates(&self) {
        for path in intermediate_paths(&self.work_dir, &self.jobname) {
            let _ = fs::remove_file(path);
        }

        if !self.options.synctex {
            let _ = fs::remove_file(
                self.work_dir
                    .join(format!("{}.synctex.gz", self.jobname)),
            );
        }
    }

    fn emit_engine_error(&self, status: &mut dyn StatusBackend) {
        let msg = engines::last_engine_error();

        if msg.is_empty() {
            tt_error!(status, "the engine failed without an error message");
        } else {
            let mut diag = Diagnostic::new_error();
            diag.append(&msg);
            diag.finish(status);
        }
    }
}

/// Compile entry point used by the CLI and the watcher: returns the
/// process exit code.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_compile(options: CompileOptions, status: &mut dyn StatusBackend) -> Result<i32> {
    let mut session = CompileSession::new(options, status)?;
    session.run(status)
}

/// Generate (and cache) a format without compiling a document. Used by the
/// `generate-format` subcommand, including from inside the browser worker.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_generate_format(
    kind: FormatKind,
    cache_dir: Option<PathBuf>,
    status: &mut dyn StatusBackend,
) -> Result<i32> {
    let config = ProjectConfig::load_for(Path::new("."));
    let endpoints = BundleEndpoints::resolve(config.as_ref());
    let cache_root = config::cache_root(cache_dir.as_deref())?;
    let host = NativeHost::new(&cache_root, &endpoints)?;
    let format_cache = FormatCache::new(host.formats_dir());

    let key = format_cache_key(&endpoints.digest, engines::ENGINE_VERSION, kind);

    if format_cache.load(&key).is_some() {
        tt_note!(status, "format {} is already cached", kind.dump_name());
        return Ok(0);
    }

    let mut world = World::new();
    let work_dir = env::current_dir()?;
    world.set_output_dir(&work_dir);
    world.attach_bundle(BundleStore::new(Box::new(host)));

    let mut options = CompileOptions::new(PathBuf::from("."));
    options.format = Some(kind);
    options.cache_dir = cache_dir;

    let mut session = CompileSession {
        build_date: options.build_date(),
        project: ProjectInput::from_file(&work_dir.join("unused.tex")),
        options,
        world,
        format_cache,
        endpoints,
        format: kind,
        jobname: "unused".to_owned(),
        work_dir,
    };

    session.ensure_format(status)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bib_markers_are_detected() {
        assert!(aux_wants_bibtex(b"\\relax\n\\bibdata{cites}\n"));
        assert!(aux_wants_bibtex(b"\\bibstyle{plain}\n"));
        assert!(aux_wants_bibtex(b"\\abx@aux@refcontext{}\n"));
        assert!(!aux_wants_bibtex(b"\\relax\n\\citation{x}\n"));
        assert!(!aux_wants_bibtex(b""));
    }

    #[test]
    fn intermediates_cover_the_cleanup_list() {
        let paths = intermediate_paths(Path::new("/w"), "paper");
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        for ext in INTERMEDIATE_EXTENSIONS {
            assert!(names.contains(&format!("paper.{}", ext)));
        }
        assert_eq!(paths.len(), INTERMEDIATE_EXTENSIONS.len());
    }

    #[test]
    fn options_merge_fills_only_unset() {
        let mut opts = CompileOptions::new(PathBuf::from("a.tex"));
        opts.synctex = true;
        opts.output = Some(PathBuf::from("cli.pdf"));

        let config: ProjectConfig = toml::from_str(
            r#"
            output = "config.pdf"
            synctex = false
            deterministic = true
            "#,
        )
        .unwrap();

        opts.apply_config(&config);

        assert_eq!(opts.output.as_deref(), Some(Path::new("cli.pdf")));
        assert!(opts.synctex);
        assert!(opts.deterministic);
        assert!(!opts.keep_intermediates);
    }

    #[test]
    fn deterministic_build_date_is_epoch() {
        let mut opts = CompileOptions::new(PathBuf::from("a.tex"));
        opts.deterministic = true;
        assert_eq!(opts.build_date(), SystemTime::UNIX_EPOCH);
    }
}
