use chrono::Utc;
use clap::Parser;

use super::{Context, open_db};
use crate::cli::{CommonArgs, Tool};
use crate::date::{self, TimeZone};
use crate::error::{CliError, EXIT_CANCELLED, EXIT_OK};
use crate::model::RepairAction;
use crate::print;
use crate::prompt::{Reply, ask};

#[derive(Parser, Debug)]
#[command(
    name = "log_repair_action",
    version,
    about = "Log a repair action to the servicelog",
    after_long_help = "Examples:\n  log_repair_action -l U78A9.001.1234567-P1-C3 -p 'Replaced adapter' -n 'jdoe'\n  log_repair_action -q -l U78A9.001.1234567-P1 -p FSPSP04 -d '2024-02-08 14:30'"
)]
pub struct RepairArgs {
    /// Location code of the device that was repaired
    #[arg(short = 'l', long)]
    pub location: Option<String>,
    /// Repair procedure that was followed
    #[arg(short = 'p', long)]
    pub procedure: Option<String>,
    /// Date/time that the procedure was performed (default: now)
    #[arg(short = 'd', long)]
    pub date: Option<String>,
    /// Include a note with the repair action (e.g. who performed it)
    #[arg(short = 'n', long)]
    pub note: Option<String>,
    /// Log the repair action without prompting for confirmation
    #[arg(short = 'q', long)]
    pub quiet: bool,
    /// Type of event this repair is for (accepted for compatibility, ignored)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub legacy_type: Option<String>,
    /// Zone used to read --date
    #[arg(long, value_enum)]
    pub time_zone: Option<TimeZone>,
    #[command(flatten)]
    pub common: CommonArgs,
}

impl RepairArgs {
    /// Build the record to log. Fails before anything touches the database.
    pub fn repair_action(&self, tz: TimeZone) -> Result<RepairAction, CliError> {
        let Some(location) = self.location.as_deref() else {
            return Err(CliError::usage("A location code was not specified"));
        };
        let procedure = match self.procedure.as_deref() {
            Some(p) => p,
            None => {
                if !self.quiet { eprintln!("{}: A procedure was not specified. Defaulting to ''", RepairArgs::NAME); }
                log::warn!("no repair procedure given; logging an empty procedure");
                ""
            }
        };
        if let Some(t) = self.legacy_type.as_deref() { log::debug!("ignoring legacy repair type '{}'", t); }
        let when = match self.date.as_deref() {
            Some(d) => date::parse_date(d, tz)?,
            None => Utc::now(),
        };
        let mut ra = RepairAction::new(location, procedure, when);
        if let Some(n) = self.note.as_ref() { ra.notes = n.clone(); }
        Ok(ra)
    }
}

pub fn run(args: &RepairArgs, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let ra = args.repair_action(ctx.tz)?;
    if !args.quiet {
        let question = format!(
            "Are you certain you wish to log the following repair action?\nDate: {}\nLocation: {}\nProcedure: {}\n(y to continue, any other key to cancel): ",
            date::display(ra.time_repair, ctx.tz),
            ra.location,
            ra.procedure
        );
        match ask(ctx.out, ctx.input, &question)? {
            Reply::Eof => return Ok(EXIT_CANCELLED),
            Reply::Line(l) if l == "y" => {}
            Reply::Line(_) => {
                writeln!(ctx.out, "\nCancelled.")?;
                return Ok(EXIT_OK);
            }
        }
    }
    let mut db = open_db(ctx)?;
    let (id, repaired) = db.repair_log(&ra).map_err(|e| CliError::log("Could not log the repair action.", e))?;
    db.close();
    if !args.quiet {
        writeln!(ctx.out, "{}: servicelog record ID = {}.", RepairArgs::NAME, id)?;
        writeln!(ctx.out, "\nThe following events were repaired:\n")?;
        print::print_events(ctx.out, &repaired, 0, ctx.tz)?;
    }
    Ok(EXIT_OK)
}

impl Tool for RepairArgs {
    const NAME: &'static str = "log_repair_action";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    fn quiet(&self) -> bool { self.quiet }
    fn time_zone(&self) -> Option<TimeZone> { self.time_zone }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { run(self, ctx) }
}
