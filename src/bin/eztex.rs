// src/bin/eztex.rs -- command-line driver for eztex
// Copyright 2016-2020 the Tectonic Project
// Licensed under the MIT License.

use structopt::StructOpt;

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use eztex::config::{self, ProjectConfig};
use eztex::driver::{run_compile, run_generate_format, CompileOptions};
use eztex::errors::Result;
use eztex::format_cache::FormatKind;
use eztex::status::plain::PlainStatusBackend;
use eztex::status::termcolor::TermcolorStatusBackend;
use eztex::status::{ChatterLevel, StatusBackend};
use eztex::{errmsg, tt_note};

#[derive(Debug, StructOpt)]
#[structopt(name = "eztex", about = "Compile (La)TeX documents, anywhere")]
enum Command {
    /// Compile a TeX file, a project directory, or a .zip archive
    Compile(CompileArgs),
    /// Compile, then recompile whenever a project file changes
    Watch(CompileArgs),
    /// Write a starter eztex.toml into the current directory
    Init,
    /// Generate and cache the format preload (used internally)
    GenerateFormat(GenerateFormatArgs),
    /// Print version information
    Version,
}

#[derive(Debug, StructOpt)]
struct CompileArgs {
    /// The file to process; a directory or .zip archive also works
    #[structopt(name = "path", parse(from_os_str))]
    input: Option<PathBuf>,
    /// Where to write the final PDF [default: alongside the input]
    #[structopt(long, short, name = "file", parse(from_os_str))]
    output: Option<PathBuf>,
    /// Which format preload to use
    #[structopt(long, name = "kind", possible_values(&["latex", "plain"]))]
    format: Option<String>,
    /// Generate SyncTeX data
    #[structopt(long)]
    synctex: bool,
    /// Use a fixed build date and stable PDF tags for reproducible output
    #[structopt(long)]
    deterministic: bool,
    /// Keep the intermediate files generated during processing
    #[structopt(short, long)]
    keep_intermediates: bool,
    /// Use this directory for the persistent file cache
    #[structopt(long, name = "dir", parse(from_os_str))]
    cache_dir: Option<PathBuf>,
    /// Print more about what is happening
    #[structopt(short, long)]
    verbose: bool,
}

#[derive(Debug, StructOpt)]
struct GenerateFormatArgs {
    /// Which format to generate
    #[structopt(name = "kind", default_value = "latex", possible_values(&["latex", "plain"]))]
    format: String,
    /// Use this directory for the persistent file cache
    #[structopt(long, name = "dir", parse(from_os_str))]
    cache_dir: Option<PathBuf>,
}

impl CompileArgs {
    fn into_options(self) -> Result<CompileOptions> {
        let input = match self.input {
            Some(p) => p,
            // No input on the command line: the project file in the
            // current directory may name an entry point.
            None => match ProjectConfig::load_for(std::path::Path::new("."))
                .and_then(|c| c.entry)
            {
                Some(entry) => PathBuf::from(entry),
                None => {
                    return Err(errmsg!(
                        "no input specified\n\nFor more information try --help"
                    ));
                }
            },
        };

        let mut options = CompileOptions::new(input);
        options.output = self.output;
        options.format = match self.format.as_deref() {
            Some(f) => Some(FormatKind::from_str(f)?),
            None => None,
        };
        options.synctex = self.synctex;
        options.deterministic = self.deterministic;
        options.keep_intermediates = self.keep_intermediates;
        options.cache_dir = self.cache_dir;
        options.verbose = self.verbose;

        Ok(options)
    }
}

/// A bare non-option argument with no subcommand means `compile <arg>`.
fn preprocess_argv() -> Vec<OsString> {
    const SUBCOMMANDS: &[&str] = &[
        "compile",
        "watch",
        "init",
        "generate-format",
        "version",
        "help",
    ];

    let mut argv: Vec<OsString> = env::args_os().collect();

    if let Some(first) = argv.get(1) {
        let as_text = first.to_string_lossy();
        if !as_text.starts_with('-') && !SUBCOMMANDS.contains(&as_text.as_ref()) {
            argv.insert(1, OsString::from("compile"));
        }
    }

    argv
}

fn inner(command: Command, status: &mut dyn StatusBackend) -> Result<i32> {
    match command {
        Command::Compile(args) => run_compile(args.into_options()?, status),

        Command::Watch(args) => {
            eztex::watch::watch_loop(args.into_options()?, status)?;
            Ok(0)
        }

        Command::Init => {
            let path = config::write_starter_config(std::path::Path::new("."))?;
            tt_note!(status, "wrote \"{}\"", path.display());
            Ok(0)
        }

        Command::GenerateFormat(args) => {
            let kind = FormatKind::from_str(&args.format)?;
            run_generate_format(kind, args.cache_dir, status)
        }

        Command::Version => {
            println!("eztex {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn main() {
    let command = Command::from_iter(preprocess_argv());

    let use_cli_color = atty::is(atty::Stream::Stderr);

    let mut status: Box<dyn StatusBackend> = if use_cli_color {
        Box::new(TermcolorStatusBackend::new(ChatterLevel::Normal))
    } else {
        Box::new(PlainStatusBackend::new(ChatterLevel::Normal))
    };

    let code = match inner(command, &mut *status) {
        Ok(code) => code,
        Err(ref e) => {
            status.report_error(e);
            1
        }
    };

    process::exit(code);
}
