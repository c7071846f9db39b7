//! ptyconv - a locale-to-UTF-8 terminal filter.
//!
//! Runs a child process on a pseudo-terminal and translates between the
//! child's locale encoding and the UTF-8 the surrounding terminal speaks,
//! in both directions, under the ISO 2022 code-extension rules.

use clap::Parser;
use ptyconv_charset::{locale, Charsets, Config};
use ptyconv_core::{InputFlags, OutputFlags, PumpBuilder};
use snafu::{prelude::*, Whatever};
use std::ffi::CStr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::{info, warn};

mod pty;
mod report;
mod shuttle;

type Result<T, E = Whatever> = std::result::Result<T, E>;

#[derive(Parser, Debug)]
#[command(about, version, max_term_width = 80)]
struct Cli {
    /// Use this encoding rather than the current locale's encoding
    #[arg(long, value_name = "NAME")]
    encoding: Option<String>,

    /// Location of the locale alias file
    #[arg(long, value_name = "FILE")]
    alias: Option<PathBuf>,

    /// Set the child's name (argv[0])
    #[arg(long, value_name = "NAME")]
    argv0: Option<String>,

    /// Simple converter from standard input to standard output
    #[arg(short = 'c', long)]
    converter: bool,

    /// Override the preference order between mapping sources
    /// (comma-separated list from: builtin, fontenc, iconv, posix)
    #[arg(long, value_name = "LIST")]
    prefer: Option<String>,

    /// Fill in one-one mappings in the --show-* reports
    #[arg(long)]
    fill_fontenc: bool,

    /// Set the output G0 charset (default ASCII)
    #[arg(long, value_name = "SET")]
    g0: Option<String>,
    /// Set the output G1 charset
    #[arg(long, value_name = "SET")]
    g1: Option<String>,
    /// Set the output G2 charset
    #[arg(long, value_name = "SET")]
    g2: Option<String>,
    /// Set the output G3 charset
    #[arg(long, value_name = "SET")]
    g3: Option<String>,
    /// Set the output GL cursor (g0..g3)
    #[arg(long, value_name = "GN", value_parser = parse_slot)]
    gl: Option<usize>,
    /// Set the output GR cursor (g0..g3)
    #[arg(long, value_name = "GN", value_parser = parse_slot)]
    gr: Option<usize>,

    /// Set the input G0 charset
    #[arg(long, value_name = "SET")]
    kg0: Option<String>,
    /// Set the input G1 charset
    #[arg(long, value_name = "SET")]
    kg1: Option<String>,
    /// Set the input G2 charset
    #[arg(long, value_name = "SET")]
    kg2: Option<String>,
    /// Set the input G3 charset
    #[arg(long, value_name = "SET")]
    kg3: Option<String>,
    /// Set the input GL cursor (g0..g3)
    #[arg(long, value_name = "GN", value_parser = parse_slot)]
    kgl: Option<usize>,
    /// Set the input GR cursor (g0..g3)
    #[arg(long, value_name = "GN", value_parser = parse_slot)]
    kgr: Option<usize>,

    /// Generate 7-bit characters for keyboard input
    #[arg(long)]
    k7: bool,
    /// Generate locking shifts SI/SO for keyboard input
    #[arg(long)]
    kls: bool,
    /// Disable generation of single shifts for keyboard input
    #[arg(long)]
    no_kss: bool,
    /// Use GL codes after a single shift
    #[arg(long)]
    no_kssgr: bool,

    /// Disable single-shift interpretation in output
    #[arg(long)]
    no_oss: bool,
    /// Disable locking-shift interpretation in output
    #[arg(long)]
    no_ols: bool,
    /// Disable charset-selection sequences in output
    #[arg(long)]
    no_osl: bool,
    /// Disable interpretation of all sequences in output
    #[arg(long)]
    ot: bool,

    /// Exit as soon as the child dies
    #[arg(short = 'x', long)]
    exit_on_child: bool,

    /// Do a parent/child handshake over a pipe pair
    #[arg(short = 'p', long)]
    handshake: bool,

    /// List the encodings known to this program
    #[arg(long)]
    list: bool,
    /// List the built-in encodings
    #[arg(long)]
    list_builtin: bool,
    /// List the available ".enc" encoding files
    #[arg(long)]
    list_fontenc: bool,
    /// List the encodings the iconv library supports
    #[arg(long)]
    list_iconv: bool,
    /// Show details of a built-in encoding
    #[arg(long, value_name = "NAME")]
    show_builtin: Option<String>,
    /// Show details of an ".enc" encoding file
    #[arg(long, value_name = "NAME")]
    show_fontenc: Option<String>,
    /// Show an iconv encoding in ".enc" format
    #[arg(long, value_name = "NAME")]
    show_iconv: Option<String>,

    /// Verbose; repeat to increase the level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// The command to run (defaults to $SHELL)
    #[arg(trailing_var_arg = true, value_name = "PROGRAM [ARGS]")]
    command: Vec<String>,
}

fn parse_slot(value: &str) -> Result<usize, String> {
    match value.as_bytes() {
        [b'g', digit @ b'0'..=b'3'] => Ok((digit - b'0') as usize),
        _ => Err(format!(
            "should be one of g0 through g3, not {value}"
        )),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init()
        .ok();
    Ok(())
}

/// Sets the process locale from the environment and reports the name to
/// use for charset resolution.
fn locale_name() -> String {
    let empty = CStr::from_bytes_with_nul(b"\0").unwrap();
    let set = unsafe { libc::setlocale(libc::LC_ALL, empty.as_ptr()) };
    if set.is_null() {
        warn!("couldn't set locale");
    } else {
        let current = unsafe { libc::setlocale(libc::LC_CTYPE, std::ptr::null()) };
        if !current.is_null() {
            if let Ok(name) = unsafe { CStr::from_ptr(current) }.to_str() {
                return name.to_string();
            }
        }
    }

    for variable in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(name) = std::env::var(variable) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    eprintln!("Couldn't get locale name -- using C");
    "C".to_string()
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let locale_name = locale_name();

    let mut config = Config::new();
    if let Some(alias) = &cli.alias {
        config.alias_file = alias.clone();
    }
    if let Some(prefer) = &cli.prefer {
        config
            .set_lookup_order(prefer)
            .with_whatever_context(|e| e.to_string())?;
    }
    config.fill_fontenc = cli.fill_fontenc;
    config.ignore_locale = cli.encoding.is_some();

    let mut registry = Charsets::new(Rc::new(config));

    if cli.list {
        report::list_known();
        return Ok(ExitCode::SUCCESS);
    }
    if cli.list_builtin {
        return Ok(report::list_builtin());
    }
    if cli.list_fontenc {
        return Ok(report::list_fontenc(&mut registry));
    }
    if cli.list_iconv {
        return Ok(report::list_iconv());
    }
    if let Some(name) = &cli.show_builtin {
        return Ok(report::show_builtin(&mut registry, name));
    }
    if let Some(name) = &cli.show_fontenc {
        return Ok(report::show_fontenc(&mut registry, name));
    }
    if let Some(name) = &cli.show_iconv {
        return Ok(report::show_iconv(&mut registry, name));
    }

    // output direction: command line first, locale fills the rest
    let mut output = PumpBuilder::new();
    for (slot, option) in [&cli.g0, &cli.g1, &cli.g2, &cli.g3].into_iter().enumerate() {
        if let Some(name) = option {
            output.g[slot] = Some(registry.get_by_name(name));
        }
    }
    output.gl = cli.gl;
    output.gr = cli.gr;
    if cli.no_oss {
        output.output_flags -= OutputFlags::SS;
    }
    if cli.no_ols {
        output.output_flags -= OutputFlags::LS;
    }
    if cli.no_osl {
        output.output_flags -= OutputFlags::SELECT;
    }
    if cli.ot {
        output.output_flags = OutputFlags::empty();
    }

    // input direction: command line, then inherited from the output side
    let mut input = PumpBuilder::new();
    for (slot, option) in [&cli.kg0, &cli.kg1, &cli.kg2, &cli.kg3]
        .into_iter()
        .enumerate()
    {
        if let Some(name) = option {
            input.g[slot] = Some(registry.get_by_name(name));
        }
    }
    input.gl = cli.kgl;
    input.gr = cli.kgr;
    if cli.k7 {
        input.input_flags -= InputFlags::EIGHT_BIT;
    }
    if cli.no_kss {
        input.input_flags -= InputFlags::SS;
    }
    if cli.no_kssgr {
        input.input_flags -= InputFlags::SS_GR;
    }
    if cli.kls {
        input.input_flags |= InputFlags::LS;
    }

    let resolved = locale::resolve_locale_state(&mut registry, &locale_name, cli.encoding.as_deref())
        .with_whatever_context(|e| format!("couldn't init output state: {e}"))?;
    output.apply_locale(&resolved);
    input.merge_from(&output);

    let mut output_pump = output.build(&registry);
    let mut input_pump = input.build(&registry);

    if cli.verbose > 0 {
        info!("{}", input_pump.report("Input"));
        info!("{}", output_pump.report("Output"));
    }

    if cli.converter {
        shuttle::convert(&mut registry, &mut output_pump)?;
        return Ok(ExitCode::SUCCESS);
    }

    let (program, args) = child_command(&cli)?;
    let session = pty::spawn(&program, &args, cli.handshake)
        .with_whatever_context(|e| format!("couldn't start the child: {e}"))?;

    shuttle::run(
        &mut registry,
        &mut input_pump,
        &mut output_pump,
        session,
        cli.exit_on_child,
    )?;

    Ok(ExitCode::SUCCESS)
}

/// The program to run and its argument vector, defaulting to `$SHELL`.
fn child_command(cli: &Cli) -> Result<(String, Vec<String>)> {
    let (path, mut args) = if cli.command.is_empty() {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        (shell, Vec::new())
    } else {
        (cli.command[0].clone(), cli.command[1..].to_vec())
    };

    let argv0 = match &cli.argv0 {
        Some(name) => name.clone(),
        None => path
            .rsplit_once('/')
            .map(|(_, base)| base.to_string())
            .unwrap_or_else(|| path.clone()),
    };
    args.insert(0, argv0);
    Ok((path, args))
}
