// src/world.rs -- the handle-indexed file world the engine compiles in
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

//! The engine sees files only through small positive integer handles that
//! index two fixed-capacity slot tables, one for inputs and one for
//! outputs. Handle 0 is reserved as the not-found/error sentinel, so the
//! engine never receives a pointer into our data and never confuses "no
//! file" with a real one.
//!
//! Inputs are file-backed or memory-backed, and every input carries a
//! one-byte pushback slot for the engine's `ungetc` habit. Outputs either
//! write straight through or buffer in memory and gzip-compress on close.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::bundle::BundleStore;
use crate::errors::{ErrorKind, Result};
use crate::host::{InputSource, OpenResult};
use crate::status::StatusBackend;

pub const MAX_INPUTS: usize = 256;
pub const MAX_OUTPUTS: usize = 256;
pub const MAX_SEARCH_DIRS: usize = 16;

/// Handles are strictly positive slot indexes; 0 never names a file.
pub type Handle = u32;

/// What kind of file the engine is asking for. The kind picks the set of
/// extensions tried during resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileFormat {
    Afm,
    Bib,
    Bst,
    Cnf,
    Enc,
    Format,
    FontMap,
    Ofm,
    OpenType,
    Ovf,
    Pict,
    Pk,
    Sfd,
    Tex,
    TexPsHeader,
    Tfm,
    TrueType,
    Type1,
    Vf,
}

impl FileFormat {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileFormat::Afm => &[".afm"],
            FileFormat::Bib => &[".bib"],
            FileFormat::Bst => &[".bst"],
            FileFormat::Cnf => &[".cnf"],
            FileFormat::Enc => &[".enc"],
            FileFormat::Format => &[".fmt"],
            FileFormat::FontMap => &[".map"],
            FileFormat::Ofm => &[".ofm"],
            FileFormat::OpenType => &[".otf", ".OTF"],
            FileFormat::Ovf => &[".ovf", ".vf"],
            FileFormat::Pict => &[".pdf", ".jpg", ".eps", ".epsi"],
            FileFormat::Pk => &[".pk"],
            FileFormat::Sfd => &[".sfd"],
            FileFormat::Tex => &[
                ".tex", ".sty", ".cls", ".fd", ".aux", ".bbl", ".def", ".clo", ".ldf",
            ],
            FileFormat::TexPsHeader => &[".pro"],
            FileFormat::Tfm => &[".tfm"],
            FileFormat::TrueType => &[".ttf", ".ttc", ".TTF", ".TTC", ".dfont"],
            FileFormat::Type1 => &[".pfa", ".pfb"],
            FileFormat::Vf => &[".vf"],
        }
    }
}

struct InputSlot {
    name: String,
    backing: InputSource,
    ungetc: Option<u8>,
}

enum OutputSink {
    Direct(File),
    /// Accumulates in memory and gzip-compresses into the file on close.
    GzDeferred { file: File, buf: Vec<u8> },
    Stdout,
}

struct OutputSlot {
    name: String,
    sink: OutputSink,
}

/// Open a file, mapping plain not-found onto `NotAvailable`.
pub fn try_open_file(path: &Path) -> OpenResult<File> {
    match File::open(path) {
        Ok(f) => OpenResult::Ok(f),
        Err(e) => {
            if e.kind() == io::ErrorKind::NotFound {
                OpenResult::NotAvailable
            } else {
                OpenResult::Err(e.into())
            }
        }
    }
}

pub struct World {
    inputs: Vec<Option<InputSlot>>,
    outputs: Vec<Option<OutputSlot>>,
    search_dirs: Vec<PathBuf>,
    primary_input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    format_data: Option<(Vec<u8>, String)>,
    last_resolved: Option<PathBuf>,
    bundle: Option<BundleStore>,
}

impl Default for World {
    fn default() -> World {
        World::new()
    }
}

impl World {
    pub fn new() -> World {
        let mut inputs = Vec::with_capacity(MAX_INPUTS + 1);
        let mut outputs = Vec::with_capacity(MAX_OUTPUTS + 1);
        inputs.resize_with(MAX_INPUTS + 1, || None);
        outputs.resize_with(MAX_OUTPUTS + 1, || None);

        World {
            inputs,
            outputs,
            search_dirs: Vec::new(),
            primary_input: None,
            output_dir: None,
            format_data: None,
            last_resolved: None,
            bundle: None,
        }
    }

    // -- configuration ----------------------------------------------------

    pub fn add_search_dir(&mut self, path: &Path) -> Result<()> {
        if self.search_dirs.len() >= MAX_SEARCH_DIRS {
            return Err(crate::errmsg!(
                "too many search directories (limit {})",
                MAX_SEARCH_DIRS
            ));
        }
        self.search_dirs.push(path.to_owned());
        Ok(())
    }

    pub fn set_primary_input(&mut self, path: &Path) {
        self.primary_input = Some(path.to_owned());
    }

    pub fn primary_input(&self) -> Option<&Path> {
        self.primary_input.as_deref()
    }

    pub fn set_output_dir(&mut self, dir: &Path) {
        self.output_dir = Some(dir.to_owned());
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Serve the named format from memory: when the engine opens a
    /// `Format`-kind file with this name, no filesystem or bundle round
    /// trip happens.
    pub fn set_format_data(&mut self, data: Vec<u8>, name: &str) {
        self.format_data = Some((data, name.to_owned()));
    }

    pub fn format_data(&self) -> Option<&[u8]> {
        self.format_data.as_ref().map(|(d, _)| d.as_slice())
    }

    pub fn attach_bundle(&mut self, store: BundleStore) {
        self.bundle = Some(store);
    }

    pub fn bundle_mut(&mut self) -> Option<&mut BundleStore> {
        self.bundle.as_mut()
    }

    pub fn detach_bundle(&mut self) -> Option<BundleStore> {
        self.bundle.take()
    }

    /// The absolute path of the most recent successful filesystem
    /// resolution, for engine diagnostics.
    pub fn last_resolved_path(&self) -> Option<&Path> {
        self.last_resolved.as_deref()
    }

    // -- slot allocation --------------------------------------------------

    fn free_input_slot(&self) -> Option<usize> {
        (1..=MAX_INPUTS).find(|&i| self.inputs[i].is_none())
    }

    fn free_output_slot(&self) -> Option<usize> {
        (1..=MAX_OUTPUTS).find(|&i| self.outputs[i].is_none())
    }

    pub fn alloc_input(&mut self, file: File, name: &str) -> Result<Handle> {
        self.alloc_input_source(InputSource::File(file), name)
    }

    pub fn alloc_memory_input(&mut self, data: Vec<u8>, name: &str) -> Result<Handle> {
        self.alloc_input_source(InputSource::from_bytes(data), name)
    }

    fn alloc_input_source(&mut self, backing: InputSource, name: &str) -> Result<Handle> {
        let slot = self
            .free_input_slot()
            .ok_or_else(|| crate::errors::Error::from(ErrorKind::HandleExhausted("input")))?;

        self.inputs[slot] = Some(InputSlot {
            name: name.to_owned(),
            backing,
            ungetc: None,
        });

        Ok(slot as Handle)
    }

    pub fn alloc_output(&mut self, file: File, name: &str, is_gz: bool) -> Result<Handle> {
        let sink = if is_gz {
            OutputSink::GzDeferred {
                file,
                buf: Vec::new(),
            }
        } else {
            OutputSink::Direct(file)
        };

        self.alloc_output_sink(sink, name)
    }

    pub fn alloc_stdout_output(&mut self) -> Result<Handle> {
        self.alloc_output_sink(OutputSink::Stdout, "<stdout>")
    }

    fn alloc_output_sink(&mut self, sink: OutputSink, name: &str) -> Result<Handle> {
        let slot = self
            .free_output_slot()
            .ok_or_else(|| crate::errors::Error::from(ErrorKind::HandleExhausted("output")))?;

        self.outputs[slot] = Some(OutputSlot {
            name: name.to_owned(),
            sink,
        });

        Ok(slot as Handle)
    }

    fn input_mut(&mut self, handle: Handle) -> Option<&mut InputSlot> {
        let idx = handle as usize;
        if idx == 0 || idx > MAX_INPUTS {
            return None;
        }
        self.inputs[idx].as_mut()
    }

    fn output_mut(&mut self, handle: Handle) -> Option<&mut OutputSlot> {
        let idx = handle as usize;
        if idx == 0 || idx > MAX_OUTPUTS {
            return None;
        }
        self.outputs[idx].as_mut()
    }

    pub fn input_name(&self, handle: Handle) -> Option<&str> {
        let idx = handle as usize;
        if idx == 0 || idx > MAX_INPUTS {
            return None;
        }
        self.inputs[idx].as_ref().map(|s| s.name.as_str())
    }

    pub fn output_name(&self, handle: Handle) -> Option<&str> {
        let idx = handle as usize;
        if idx == 0 || idx > MAX_OUTPUTS {
            return None;
        }
        self.outputs[idx].as_ref().map(|s| s.name.as_str())
    }

    // -- input operations -------------------------------------------------

    pub fn input_read(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize> {
        let slot = match self.input_mut(handle) {
            Some(s) => s,
            None => return Err(crate::errmsg!("read on invalid input handle {}", handle)),
        };

        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(c) = slot.ungetc.take() {
            buf[0] = c;
            let n = slot.backing.read(&mut buf[1..])?;
            return Ok(n + 1);
        }

        Ok(slot.backing.read(buf)?)
    }

    /// `getc()` emulation that honors a previously pushed-back byte.
    pub fn input_getc(&mut self, handle: Handle) -> Result<u8> {
        let mut byte = [0u8; 1];
        if self.input_read(handle, &mut byte)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "EOF in getc").into());
        }
        Ok(byte[0])
    }

    /// `ungetc()` emulation. Only one byte of pushback is available.
    pub fn input_ungetc(&mut self, handle: Handle, byte: u8) -> Result<()> {
        let slot = match self.input_mut(handle) {
            Some(s) => s,
            None => return Err(crate::errmsg!("ungetc on invalid input handle {}", handle)),
        };

        if slot.ungetc.is_some() {
            return Err(crate::errmsg!("cannot ungetc() more than once in a row"));
        }

        slot.ungetc = Some(byte);
        Ok(())
    }

    /// Seek with pushback transparency: a zero-offset `SEEK_CUR` reports
    /// the logical position (one less than the backing position while a
    /// byte is pushed back); any other relative seek first applies a -1
    /// adjustment for pending pushback and clears it; absolute and
    /// end-relative seeks just clear it.
    pub fn input_seek(&mut self, handle: Handle, pos: SeekFrom) -> Result<u64> {
        let slot = match self.input_mut(handle) {
            Some(s) => s,
            None => return Err(crate::errmsg!("seek on invalid input handle {}", handle)),
        };

        match pos {
            SeekFrom::Current(0) => {
                let raw = slot.backing.seek(SeekFrom::Current(0))?;
                let adjust = if slot.ungetc.is_some() { 1 } else { 0 };
                Ok(raw.saturating_sub(adjust))
            }
            SeekFrom::Current(n) => {
                let adjust = if slot.ungetc.take().is_some() { -1 } else { 0 };
                Ok(slot.backing.seek(SeekFrom::Current(n + adjust))?)
            }
            other => {
                slot.ungetc = None;
                Ok(slot.backing.seek(other)?)
            }
        }
    }

    pub fn close_input(&mut self, handle: Handle) {
        let idx = handle as usize;
        if idx >= 1 && idx <= MAX_INPUTS {
            self.inputs[idx] = None;
        }
    }

    // -- output operations ------------------------------------------------

    pub fn output_write(&mut self, handle: Handle, buf: &[u8]) -> Result<usize> {
        let slot = match self.output_mut(handle) {
            Some(s) => s,
            None => return Err(crate::errmsg!("write on invalid output handle {}", handle)),
        };

        match &mut slot.sink {
            OutputSink::Direct(f) => Ok(f.write(buf)?),
            OutputSink::GzDeferred { buf: mem, .. } => {
                mem.extend_from_slice(buf);
                Ok(buf.len())
            }
            OutputSink::Stdout => Ok(io::stdout().write(buf)?),
        }
    }

    pub fn output_flush(&mut self, handle: Handle) -> Result<()> {
        let slot = match self.output_mut(handle) {
            Some(s) => s,
            None => return Err(crate::errmsg!("flush on invalid output handle {}", handle)),
        };

        match &mut slot.sink {
            OutputSink::Direct(f) => f.flush()?,
            OutputSink::GzDeferred { .. } => {}
            OutputSink::Stdout => io::stdout().flush()?,
        }

        Ok(())
    }

    /// Close an output. For gzip-deferred outputs this is where the whole
    /// buffer is compressed and streamed out; the encoder writes through
    /// our own handle so the position stays right even if the descriptor
    /// was duplicated somewhere below us.
    pub fn close_output(&mut self, handle: Handle) -> Result<()> {
        let idx = handle as usize;
        if idx == 0 || idx > MAX_OUTPUTS {
            return Err(crate::errmsg!("close on invalid output handle {}", handle));
        }

        let slot = match self.outputs[idx].take() {
            Some(s) => s,
            None => return Err(crate::errmsg!("close on unallocated output handle {}", handle)),
        };

        match slot.sink {
            OutputSink::Direct(mut f) => f.flush()?,
            OutputSink::GzDeferred { mut file, buf } => {
                let mut enc = GzEncoder::new(&mut file, Compression::default());
                enc.write_all(&buf)?;
                enc.finish()?;
                file.flush()?;
            }
            OutputSink::Stdout => io::stdout().flush()?,
        }

        Ok(())
    }

    // -- resolution -------------------------------------------------------

    /// Open an input by name. Resolution order: the name as given against
    /// the working directory, then against each search directory, then the
    /// same with each format-specific extension appended, and finally the
    /// whole sequence of candidates against the bundle store if one is
    /// attached.
    pub fn try_open_input(
        &mut self,
        name: &str,
        format: FileFormat,
        status: &mut dyn StatusBackend,
    ) -> OpenResult<Handle> {
        // The in-memory format blob short-circuits everything.
        if format == FileFormat::Format {
            if let Some((data, fmt_name)) = &self.format_data {
                if fmt_name == name {
                    let data = data.clone();
                    return match self.alloc_memory_input(data, name) {
                        Ok(h) => OpenResult::Ok(h),
                        Err(e) => OpenResult::Err(e),
                    };
                }
            }
        }

        let mut candidates = vec![name.to_owned()];
        for ext in format.extensions() {
            candidates.push(format!("{}{}", name, ext));
        }

        for candidate in &candidates {
            match self.try_open_fs_candidate(candidate) {
                OpenResult::Ok(h) => return OpenResult::Ok(h),
                OpenResult::Err(e) => return OpenResult::Err(e),
                OpenResult::NotAvailable => {}
            }
        }

        if self.bundle.is_some() {
            for candidate in &candidates {
                let resolved = self.bundle.as_mut().unwrap().resolve(candidate, status);

                match resolved {
                    OpenResult::Ok(src) => {
                        return match self.alloc_input_source(src, candidate) {
                            Ok(h) => OpenResult::Ok(h),
                            Err(e) => OpenResult::Err(e),
                        };
                    }
                    OpenResult::Err(e) => return OpenResult::Err(e),
                    OpenResult::NotAvailable => {}
                }
            }
        }

        OpenResult::NotAvailable
    }

    fn try_open_fs_candidate(&mut self, candidate: &str) -> OpenResult<Handle> {
        let direct = PathBuf::from(candidate);

        match try_open_file(&direct) {
            OpenResult::Ok(f) => {
                self.note_resolved(&direct);
                return match self.alloc_input(f, candidate) {
                    Ok(h) => OpenResult::Ok(h),
                    Err(e) => OpenResult::Err(e),
                };
            }
            OpenResult::Err(e) => return OpenResult::Err(e),
            OpenResult::NotAvailable => {}
        }

        for i in 0..self.search_dirs.len() {
            let path = self.search_dirs[i].join(candidate);

            match try_open_file(&path) {
                OpenResult::Ok(f) => {
                    self.note_resolved(&path);
                    return match self.alloc_input(f, candidate) {
                        Ok(h) => OpenResult::Ok(h),
                        Err(e) => OpenResult::Err(e),
                    };
                }
                OpenResult::Err(e) => return OpenResult::Err(e),
                OpenResult::NotAvailable => {}
            }
        }

        OpenResult::NotAvailable
    }

    fn note_resolved(&mut self, path: &Path) {
        self.last_resolved = std::fs::canonicalize(path).ok().or_else(|| Some(path.to_owned()));
    }

    /// Open the primary input configured for this compile.
    pub fn open_primary(&mut self) -> OpenResult<Handle> {
        let path = match &self.primary_input {
            Some(p) => p.clone(),
            None => return OpenResult::NotAvailable,
        };

        match try_open_file(&path) {
            OpenResult::Ok(f) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned());
                self.note_resolved(&path);
                match self.alloc_input(f, &name) {
                    Ok(h) => OpenResult::Ok(h),
                    Err(e) => OpenResult::Err(e),
                }
            }
            OpenResult::NotAvailable => OpenResult::NotAvailable,
            OpenResult::Err(e) => OpenResult::Err(e),
        }
    }

    /// Close every open handle and zero the tables, keeping the compile
    /// configuration (search paths, primary input, output dir, format
    /// blob, bundle store). Passes communicate via disk, so this runs
    /// between every pair of engine passes.
    pub fn reset_io(&mut self) -> Result<()> {
        for i in 1..=MAX_INPUTS {
            self.inputs[i] = None;
        }

        for i in 1..=MAX_OUTPUTS {
            if self.outputs[i].is_some() {
                self.close_output(i as Handle)?;
            }
        }

        Ok(())
    }

    pub fn open_input_count(&self) -> usize {
        self.inputs.iter().filter(|s| s.is_some()).count()
    }

    pub fn open_output_count(&self) -> usize {
        self.outputs.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NoopStatusBackend;
    use flate2::read::GzDecoder;
    use std::fs;
    use tempfile::TempDir;

    fn memory_world_with(data: &[u8]) -> (World, Handle) {
        let mut world = World::new();
        let h = world.alloc_memory_input(data.to_vec(), "mem.tex").unwrap();
        (world, h)
    }

    #[test]
    fn handle_zero_is_never_allocated() {
        let mut world = World::new();
        for _ in 0..5 {
            let h = world.alloc_memory_input(vec![1, 2, 3], "x").unwrap();
            assert!(h >= 1);
        }
        assert!(world.input_name(0).is_none());
        assert!(world.output_name(0).is_none());
    }

    #[test]
    fn input_table_exhausts_at_capacity() {
        let mut world = World::new();
        for _ in 0..MAX_INPUTS {
            world.alloc_memory_input(Vec::new(), "x").unwrap();
        }
        assert!(world.alloc_memory_input(Vec::new(), "x").is_err());
    }

    #[test]
    fn handles_are_reused_after_close() {
        let mut world = World::new();
        let h = world.alloc_memory_input(Vec::new(), "x").unwrap();
        world.close_input(h);
        let h2 = world.alloc_memory_input(Vec::new(), "y").unwrap();
        assert_eq!(h, h2);
    }

    #[test]
    fn pushback_transparency() {
        let (mut world, h) = memory_world_with(b"abc");

        assert_eq!(world.input_getc(h).unwrap(), b'a');
        world.input_ungetc(h, b'a').unwrap();
        assert_eq!(world.input_getc(h).unwrap(), b'a');
        assert_eq!(world.input_getc(h).unwrap(), b'b');
    }

    #[test]
    fn double_ungetc_is_rejected() {
        let (mut world, h) = memory_world_with(b"abc");
        world.input_getc(h).unwrap();
        world.input_ungetc(h, b'a').unwrap();
        assert!(world.input_ungetc(h, b'z').is_err());
    }

    #[test]
    fn seek_cur_zero_reports_logical_position() {
        let (mut world, h) = memory_world_with(b"abcdef");

        world.input_getc(h).unwrap();
        world.input_getc(h).unwrap();
        assert_eq!(world.input_seek(h, SeekFrom::Current(0)).unwrap(), 2);

        world.input_ungetc(h, b'b').unwrap();
        assert_eq!(world.input_seek(h, SeekFrom::Current(0)).unwrap(), 1);

        // the pushed-back byte is still there
        assert_eq!(world.input_getc(h).unwrap(), b'b');
        assert_eq!(world.input_seek(h, SeekFrom::Current(0)).unwrap(), 2);
    }

    #[test]
    fn relative_seek_consumes_pushback_with_adjustment() {
        let (mut world, h) = memory_world_with(b"abcdef");

        world.input_getc(h).unwrap();
        world.input_getc(h).unwrap();
        world.input_ungetc(h, b'b').unwrap();

        // logical position is 1; skipping 2 logical bytes lands on 'd'
        let pos = world.input_seek(h, SeekFrom::Current(2)).unwrap();
        assert_eq!(pos, 3);
        assert_eq!(world.input_getc(h).unwrap(), b'd');
    }

    #[test]
    fn absolute_seek_clears_pushback() {
        let (mut world, h) = memory_world_with(b"abcdef");

        world.input_getc(h).unwrap();
        world.input_ungetc(h, b'a').unwrap();
        world.input_seek(h, SeekFrom::Start(3)).unwrap();
        assert_eq!(world.input_getc(h).unwrap(), b'd');
    }

    #[test]
    fn read_consumes_pushback_first() {
        let (mut world, h) = memory_world_with(b"abc");

        world.input_getc(h).unwrap();
        world.input_ungetc(h, b'a').unwrap();

        let mut buf = [0u8; 3];
        let n = world.input_read(h, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn resolution_tries_extensions_and_search_dirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("doc.tex"), b"\\relax").unwrap();
        fs::write(dir.path().join("cm.tfm"), b"tfm").unwrap();

        let mut world = World::new();
        world.add_search_dir(dir.path()).unwrap();
        let mut status = NoopStatusBackend::new();

        match world.try_open_input("doc", FileFormat::Tex, &mut status) {
            OpenResult::Ok(h) => assert_eq!(world.input_name(h), Some("doc.tex")),
            _ => panic!("doc.tex should resolve via the .tex extension"),
        }

        match world.try_open_input("cm", FileFormat::Tfm, &mut status) {
            OpenResult::Ok(h) => assert_eq!(world.input_name(h), Some("cm.tfm")),
            _ => panic!("cm.tfm should resolve via the .tfm extension"),
        }

        assert!(world
            .try_open_input("doc", FileFormat::Tfm, &mut status)
            .is_not_available());
    }

    #[test]
    fn search_dir_capacity_is_bounded() {
        let dir = TempDir::new().unwrap();
        let mut world = World::new();

        for _ in 0..MAX_SEARCH_DIRS {
            world.add_search_dir(dir.path()).unwrap();
        }
        assert!(world.add_search_dir(dir.path()).is_err());
    }

    #[test]
    fn format_blob_is_served_from_memory() {
        let mut world = World::new();
        world.set_format_data(b"FMTBLOB".to_vec(), "xelatex.fmt");
        let mut status = NoopStatusBackend::new();

        match world.try_open_input("xelatex.fmt", FileFormat::Format, &mut status) {
            OpenResult::Ok(h) => {
                let mut buf = [0u8; 7];
                world.input_read(h, &mut buf).unwrap();
                assert_eq!(&buf, b"FMTBLOB");
            }
            _ => panic!("format blob should come from memory"),
        }

        // a different name does not match the blob
        assert!(world
            .try_open_input("plain.fmt", FileFormat::Format, &mut status)
            .is_not_available());
    }

    #[test]
    fn gz_deferred_output_compresses_on_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.synctex.gz");

        let mut world = World::new();
        let h = world
            .alloc_output(File::create(&path).unwrap(), "doc.synctex.gz", true)
            .unwrap();

        world.output_write(h, b"synctex ").unwrap();
        world.output_write(h, b"payload").unwrap();
        world.close_output(h).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"synctex payload");
    }

    #[test]
    fn reset_io_closes_everything_but_keeps_config() {
        let dir = TempDir::new().unwrap();
        let mut world = World::new();
        world.add_search_dir(dir.path()).unwrap();
        world.set_primary_input(&dir.path().join("main.tex"));
        world.set_format_data(vec![1], "xelatex.fmt");

        world.alloc_memory_input(vec![0], "a").unwrap();
        let out = File::create(dir.path().join("o.log")).unwrap();
        world.alloc_output(out, "o.log", false).unwrap();

        world.reset_io().unwrap();

        assert_eq!(world.open_input_count(), 0);
        assert_eq!(world.open_output_count(), 0);
        assert!(world.primary_input().is_some());
        assert!(world.format_data().is_some());
    }
}
