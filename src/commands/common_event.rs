use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, ValueEnum};

use super::{Context, open_db};
use crate::cli::{CommonArgs, Tool};
use crate::error::{CliError, EXIT_OK};
use crate::model::{Event, EventType, SEV_EVENT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum CommonEvent { Migration, FwUpdate, DumpOs }

impl CommonEvent {
    pub fn refcode(self) -> &'static str {
        match self { CommonEvent::Migration => "#MIGRATION", CommonEvent::FwUpdate => "#FW_UPDATE", CommonEvent::DumpOs => "#DUMP_OS" }
    }
}

#[derive(Parser, Debug)]
#[command(name = "slog_common_event", version, about = "Log a common informational event to the servicelog")]
pub struct CommonEventArgs {
    #[arg(short = 'e', long, value_enum)]
    pub event: Option<CommonEvent>,
    /// Time that the event occurred, in seconds since the epoch (default: now)
    #[arg(short = 't', long)]
    pub time: Option<i64>,
    /// Source of a migration, or firmware level prior to an update
    #[arg(short = 's', long)]
    pub source: Option<String>,
    /// Destination of a migration, or firmware level after an update
    #[arg(short = 'd', long)]
    pub destination: Option<String>,
    /// Location of dump data
    #[arg(short = 'l', long)]
    pub location: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(flatten)]
    pub common: CommonArgs,
}

impl CommonEventArgs {
    pub fn build_event(&self) -> Result<Event, CliError> {
        let Some(kind) = self.event else { return Err(CliError::usage("The --event command-line argument is required.")) };
        let need = |v: &Option<String>, flag: &str| -> Result<String, CliError> {
            v.clone().ok_or_else(|| CliError::usage(format!("The --{} command-line argument is required for {} events.", flag, kind.to_possible_value().map(|p| p.get_name().to_string()).unwrap_or_default())))
        };
        let description = match kind {
            CommonEvent::Migration => {
                let s = need(&self.source, "source")?;
                let d = need(&self.destination, "destination")?;
                format!("Partition migration completed.  Source: {} Destination: {}", s, d)
            }
            CommonEvent::FwUpdate => {
                let s = self.source.clone().unwrap_or_else(|| "<unknown>".to_string());
                let d = need(&self.destination, "destination")?;
                format!("System firmware update completed.  Prior Level: {} New Level: {}", s, d)
            }
            CommonEvent::DumpOs => {
                let l = need(&self.location, "location")?;
                format!("An OS dump has been collected and is available at {}", l)
            }
        };
        let when = match self.time.filter(|t| *t != 0) {
            Some(t) => DateTime::from_timestamp(t, 0).ok_or_else(|| CliError::usage(format!("--time value {} is out of range", t)))?,
            None => Utc::now(),
        };
        let mut event = Event::new(EventType::Basic, SEV_EVENT, when);
        event.refcode = kind.refcode().to_string();
        event.description = description;
        Ok(event)
    }
}

pub fn run(args: &CommonEventArgs, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let event = args.build_event()?;
    let mut db = open_db(ctx)?;
    let id = db.event_log(&event).map_err(|e| CliError::log("Error logging event.", e))?;
    db.close();
    if args.verbose > 0 { writeln!(ctx.out, "Logged event number {}", id)?; }
    Ok(EXIT_OK)
}

impl Tool for CommonEventArgs {
    const NAME: &'static str = "slog_common_event";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    // Errors stay silent unless -v was given.
    fn quiet(&self) -> bool { self.verbose == 0 }
    fn verbose(&self) -> u8 { self.verbose }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { run(self, ctx) }
}
