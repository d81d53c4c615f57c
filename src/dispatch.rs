use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::{ArgAction, Parser};

use crate::cli::{self, CommonArgs};
use crate::error::{CliError, EXIT_DB, EXIT_OK};
use crate::logging::{self, LogOptions};

pub const LEGACY_TOOL: &str = "v29_servicelog";
pub const MODERN_TOOL: &str = "v1_servicelog";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor { Legacy, Modern }

impl Flavor {
    pub fn program(self) -> &'static str {
        match self { Flavor::Legacy => LEGACY_TOOL, Flavor::Modern => MODERN_TOOL }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route { Help, Version, Run(Flavor) }

/// Union of both flag families. Values are not checked here; the sibling
/// that receives them does that.
#[allow(dead_code)]
#[derive(Parser, Debug)]
#[command(name = "servicelog", disable_help_flag = true, disable_version_flag = true)]
struct SwitchArgs {
    #[arg(short = 'i', long = "id")]
    id: Option<String>,
    #[arg(short = 't', long = "type")]
    types: Vec<String>,
    #[arg(short = 's', long = "start_time")]
    start_time: Option<String>,
    #[arg(short = 'e', long = "end_time")]
    end_time: Option<String>,
    #[arg(short = 'E', long = "severity")]
    severity: Option<String>,
    #[arg(short = 'S', long = "serviceable")]
    serviceable: Option<String>,
    #[arg(short = 'R', long = "repair_action")]
    repair_action: Option<String>,
    #[arg(short = 'r', long = "event_repaired")]
    event_repaired: Option<String>,
    #[arg(short = 'q', long = "query")]
    query: Option<String>,
    #[arg(short = 'd', long = "dump")]
    dump: bool,
    #[arg(short = 'h', long = "help")]
    help: bool,
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'V', long = "version")]
    version: bool,
    #[command(flatten)]
    common: CommonArgs,
}

impl SwitchArgs {
    fn legacy_count(&self) -> usize {
        [
            self.id.is_some(),
            !self.types.is_empty(),
            self.start_time.is_some(),
            self.end_time.is_some(),
            self.severity.is_some(),
            self.serviceable.is_some(),
            self.repair_action.is_some(),
            self.event_repaired.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    fn modern_count(&self) -> usize { usize::from(self.query.is_some()) + usize::from(self.dump) }
}

/// Decide what to do with a full argument vector (program name first).
pub fn classify<I, S>(argv: I) -> Result<Route, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let args = SwitchArgs::try_parse_from(argv).map_err(|e| CliError::usage(e.render().to_string().trim_end()))?;
    if args.help { return Ok(Route::Help); }
    if args.version { return Ok(Route::Version); }
    let (legacy, modern) = (args.legacy_count(), args.modern_count());
    log::debug!("dispatch: {} legacy flags, {} current flags", legacy, modern);
    if legacy > 0 && modern > 0 {
        return Err(CliError::usage("You cannot mix v0.2.9 options with v1+ options."));
    }
    Ok(Route::Run(if legacy > 0 { Flavor::Legacy } else { Flavor::Modern }))
}

/// Siblings live next to the running executable.
pub fn sibling_path(exe: &Path, flavor: Flavor) -> Result<PathBuf, CliError> {
    let dir = exe.parent().filter(|d| !d.as_os_str().is_empty()).ok_or_else(|| {
        CliError::Launch(format!("cannot find {} and/or {}: {} has no parent directory", MODERN_TOOL, LEGACY_TOOL, exe.display()))
    })?;
    Ok(dir.join(flavor.program()))
}

/// Run `program` with `args`, wait for it and return its exit status.
pub fn run_sibling(program: &Path, args: &[OsString]) -> Result<i32, CliError> {
    log::info!("running {}", program.display());
    let status = Command::new(program).args(args).status().map_err(|e| CliError::Launch(format!("could not execute {}: {}", program.display(), e)))?;
    Ok(exit_status_code(status))
}

fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    if let Some(c) = status.code() { return c; }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() { return 128 + sig; }
    }
    EXIT_DB
}

/// Both siblings' usage texts, one after the other.
pub fn print_usage(out: &mut dyn Write, exe: &Path) -> Result<(), CliError> {
    writeln!(out, "This command supports two mutually exclusive sets of command-line options.")?;
    writeln!(out, "Here are the command-line options supported for compatibility with the\n0.2.9 version of servicelog:\n")?;
    sibling_usage(out, &sibling_path(exe, Flavor::Legacy)?)?;
    writeln!(out, "\nHere are the command-line options for the current ({}) version of\nservicelog:\n", env!("CARGO_PKG_VERSION"))?;
    sibling_usage(out, &sibling_path(exe, Flavor::Modern)?)?;
    Ok(())
}

fn sibling_usage(out: &mut dyn Write, program: &Path) -> Result<(), CliError> {
    match Command::new(program).arg("-h").output() {
        Ok(o) => out.write_all(&o.stdout)?,
        Err(e) => writeln!(out, "(could not run {}: {})", program.display(), e)?,
    }
    Ok(())
}

/// Full dispatcher behavior for an argument vector and the path of the
/// running executable.
pub fn dispatch(argv: &[OsString], exe: &Path, out: &mut dyn Write) -> Result<i32, CliError> {
    match classify(argv.iter().cloned())? {
        Route::Help => {
            print_usage(out, exe)?;
            Ok(EXIT_OK)
        }
        Route::Version => {
            writeln!(out, "servicelog: Version {}", env!("CARGO_PKG_VERSION"))?;
            Ok(EXIT_OK)
        }
        Route::Run(flavor) => {
            out.flush()?;
            run_sibling(&sibling_path(exe, flavor)?, argv.get(1..).unwrap_or(&[]))
        }
    }
}

/// Entry point of the `servicelog` binary.
pub fn main() -> ! {
    logging::init(&LogOptions::default());
    let argv: Vec<OsString> = std::env::args_os().collect();
    let result = std::env::current_exe()
        .map_err(|e| CliError::Launch(format!("cannot locate the running executable: {}", e)))
        .and_then(|exe| {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            dispatch(&argv, &exe, &mut out)
        });
    cli::finish("servicelog", result, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(args: &[&str]) -> Result<Route, CliError> {
        classify(std::iter::once("servicelog").chain(args.iter().copied()))
    }

    #[test]
    fn modern_is_the_default() {
        assert_eq!(route(&[]).unwrap(), Route::Run(Flavor::Modern));
        assert_eq!(route(&["-v"]).unwrap(), Route::Run(Flavor::Modern));
        assert_eq!(route(&["--dump"]).unwrap(), Route::Run(Flavor::Modern));
        assert_eq!(route(&["-q", "severity>=4"]).unwrap(), Route::Run(Flavor::Modern));
    }

    #[test]
    fn each_legacy_flag_routes_to_legacy() {
        for args in [
            &["--id", "3"][..],
            &["-t", "os"],
            &["--start_time", "100"],
            &["-e", "200"],
            &["-E", "4"],
            &["--serviceable=yes"],
            &["-R", "all"],
            &["--event_repaired", "no"],
        ] {
            assert_eq!(route(args).unwrap(), Route::Run(Flavor::Legacy), "{:?}", args);
        }
    }

    #[test]
    fn mixing_families_is_a_usage_error() {
        let err = route(&["--dump", "--type", "os"]).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "You cannot mix v0.2.9 options with v1+ options.");
        assert_eq!(route(&["-E", "5", "-q", "id=1"]).unwrap_err().exit_code(), 1);
    }

    #[test]
    fn help_and_version() {
        assert_eq!(route(&["--help"]).unwrap(), Route::Help);
        assert_eq!(route(&["-V"]).unwrap(), Route::Version);
        assert!(route(&["--bogus"]).is_err());
    }

    #[test]
    fn siblings_share_the_executable_directory() {
        let exe = Path::new("/usr/bin/servicelog");
        assert_eq!(sibling_path(exe, Flavor::Legacy).unwrap(), PathBuf::from("/usr/bin/v29_servicelog"));
        assert_eq!(sibling_path(exe, Flavor::Modern).unwrap(), PathBuf::from("/usr/bin/v1_servicelog"));
        assert_eq!(sibling_path(Path::new("servicelog"), Flavor::Modern).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn missing_sibling_is_a_launch_failure() {
        let dir = std::env::temp_dir().join(format!("servicelog_dispatch_missing_{}", std::process::id()));
        let argv: Vec<OsString> = vec!["servicelog".into(), "--dump".into()];
        let mut out = Vec::new();
        let err = dispatch(&argv, &dir.join("servicelog"), &mut out).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn forwards_arguments_and_exit_status() {
        use std::os::unix::fs::PermissionsExt;
        let dir = std::env::temp_dir().join(format!("servicelog_dispatch_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("args.txt");
        let script = format!("#!/bin/sh\necho \"$@\" > '{}'\nexit 7\n", log.display());
        let child = dir.join(LEGACY_TOOL);
        std::fs::write(&child, script).unwrap();
        std::fs::set_permissions(&child, std::fs::Permissions::from_mode(0o755)).unwrap();

        let argv: Vec<OsString> = ["servicelog", "--type", "os", "-E", "5"].iter().map(OsString::from).collect();
        let mut out = Vec::new();
        let code = dispatch(&argv, &dir.join("servicelog"), &mut out).unwrap();
        assert_eq!(code, 7);
        assert_eq!(std::fs::read_to_string(&log).unwrap().trim(), "--type os -E 5");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
