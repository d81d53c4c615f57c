use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args, Parser};
use clap_complete::Shell;

use crate::commands::Context;
use crate::config::{self, AppConfig};
use crate::date::TimeZone;
use crate::error::{CliError, EXIT_OK, EXIT_USAGE};
use crate::logging::{self, LogFormat, LogLevel, LogOptions};
use crate::print;

/// Flags every tool accepts. Long names only, so they never collide with a
/// tool's own short flags.
#[derive(Args, Debug, Default, Clone)]
pub struct CommonArgs {
    /// Servicelog database file
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
    /// Configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
    /// Append log records to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<String>,
    #[arg(long)]
    pub no_color: bool,
    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

/// A servicelog command-line tool.
pub trait Tool: Parser {
    const NAME: &'static str;

    fn common(&self) -> &CommonArgs;
    fn common_mut(&mut self) -> &mut CommonArgs;
    fn quiet(&self) -> bool { false }
    fn verbose(&self) -> u8 { 0 }
    fn time_zone(&self) -> Option<TimeZone> { None }
    /// A database path that outranks `--db`.
    fn db_override(&self) -> Option<&Path> { None }
    /// Print usage and exit 0 when invoked with no arguments at all.
    fn help_when_bare() -> bool { false }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError>;
}

pub fn clap_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => EXIT_OK,
        _ => EXIT_USAGE,
    }
}

pub fn parse_from_or_exit<T, I, S>(argv: I) -> T
where
    T: Parser,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    match T::try_parse_from(argv) {
        Ok(a) => a,
        Err(e) => {
            let code = clap_exit_code(e.kind());
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Fold config file values into flags the user left unset.
pub fn apply_config(common: &mut CommonArgs, cfg: &AppConfig) {
    if common.log_level.is_none() && let Some(v) = cfg.log_level { common.log_level = Some(v); }
    if common.log_format.is_none() && let Some(v) = cfg.log_format { common.log_format = Some(v); }
    if common.log_path.is_none() && let Some(v) = cfg.log_path.as_ref() { common.log_path = Some(v.clone()); }
    if let Some(v) = cfg.no_color && v { common.no_color = true; }
}

pub struct Setup {
    pub db_path: PathBuf,
    pub time_zone: TimeZone,
}

/// Load config, start logging and decide on colors. `Ok(None)` means the
/// request was already served (completions).
pub fn bootstrap<T: Tool>(tool: &mut T) -> Result<Option<Setup>, CliError> {
    if let Some(sh) = tool.common().completions {
        let mut cmd = T::command();
        clap_complete::generate(sh, &mut cmd, T::NAME, &mut std::io::stdout());
        return Ok(None);
    }
    let cfg = config::load(tool.common().config.as_deref()).map_err(CliError::Config)?;
    apply_config(tool.common_mut(), &cfg);
    let common = tool.common();
    logging::init(&LogOptions {
        level: common.log_level,
        format: common.log_format,
        path: common.log_path.clone(),
        quiet: tool.quiet(),
        verbose: tool.verbose(),
    });
    print::init_color(common.no_color);
    let cli_db = tool.db_override().or(common.db.as_deref());
    let db_path = config::resolve_db_path(cli_db, config::db_path_from_env().as_deref(), &cfg);
    let time_zone = tool.time_zone().or(cfg.time_zone).unwrap_or_default();
    log::debug!("{}: database {}", T::NAME, db_path.display());
    Ok(Some(Setup { db_path, time_zone }))
}

/// Report the outcome and terminate with its exit status.
pub fn finish(prog: &str, result: Result<i32, CliError>, quiet: bool) -> ! {
    let _ = std::io::stdout().flush();
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if !quiet {
                eprintln!("{}: {}", prog, e);
                if matches!(e, CliError::Usage(_)) { eprintln!("Try '{} --help' for more information.", prog); }
            }
            std::process::exit(e.exit_code())
        }
    }
}

/// Entry point shared by the tool binaries.
pub fn main<T: Tool>() -> ! {
    if T::help_when_bare() && std::env::args_os().len() <= 1 {
        let _ = T::command().print_help();
        std::process::exit(EXIT_OK);
    }
    let mut tool: T = parse_from_or_exit(std::env::args_os());
    let quiet = tool.quiet();
    let setup = match bootstrap(&mut tool) {
        Ok(Some(s)) => s,
        Ok(None) => finish(T::NAME, Ok(EXIT_OK), quiet),
        Err(e) => finish(T::NAME, Err(e), quiet),
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut ctx = Context { db_path: setup.db_path, tz: setup.time_zone, out: &mut out, input: &mut input };
    let result = tool.run(&mut ctx);
    finish(T::NAME, result, quiet)
}

#[cfg(unix)]
pub fn running_as_root() -> bool { unsafe { libc::geteuid() == 0 } }

#[cfg(not(unix))]
pub fn running_as_root() -> bool { false }
