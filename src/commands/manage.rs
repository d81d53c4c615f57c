use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};

use super::{Context, open_db};
use crate::cli::{self, CommonArgs, Tool};
use crate::error::{CliError, EXIT_CANCELLED, EXIT_OK};
use crate::prompt::{Reply, ask};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TruncateTarget { Events, Notify }

#[derive(Parser, Debug)]
#[command(name = "servicelog_manage", version, about = "Servicelog database maintenance")]
pub struct ManageArgs {
    /// Print the number of logged events and repair actions
    #[arg(short = 's', long)]
    pub status: bool,
    /// Delete all events and repair actions, or all notification tools
    #[arg(short = 't', long, value_enum, value_name = "events|notify")]
    pub truncate: Option<TruncateTarget>,
    /// Remove repaired events and stale records
    #[arg(short = 'c', long)]
    pub clean: bool,
    /// Age in days used by --clean
    #[arg(short = 'a', long, default_value_t = 60)]
    pub age: u32,
    /// Do not prompt for confirmation
    #[arg(short = 'f', long)]
    pub force: bool,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action { Status, Truncate(TruncateTarget), Clean }

impl ManageArgs {
    pub fn action(&self) -> Result<Action, CliError> {
        let mut chosen = vec![];
        if self.status { chosen.push(Action::Status); }
        if let Some(t) = self.truncate { chosen.push(Action::Truncate(t)); }
        if self.clean { chosen.push(Action::Clean); }
        match chosen.as_slice() {
            [] => Err(CliError::usage("One of the action options is required.")),
            [a] => Ok(*a),
            _ => Err(CliError::usage("Only one of the action options may be specified.")),
        }
    }
}

/// `Ok(true)` to proceed. EOF aborts with a database-class status.
fn confirm(ctx: &mut Context<'_>, question: &str) -> Result<bool, CliError> {
    writeln!(ctx.out, "{}", question)?;
    match ask(ctx.out, ctx.input, "Enter 'yes' to continue > ")? {
        Reply::Eof => Err(CliError::NoReply),
        Reply::Line(l) => Ok(l.eq_ignore_ascii_case("yes")),
    }
}

fn status(ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let db = open_db(ctx)?;
    let events = db.event_query("")?;
    let repairs = db.repair_query("")?.len();
    db.close();
    let repaired = events.iter().filter(|e| e.serviceable && e.repair > 0).count();
    let unrepaired = events.iter().filter(|e| e.serviceable && e.repair == 0).count();
    let info = events.iter().filter(|e| !e.serviceable).count();
    writeln!(ctx.out, "{:<39}{:>10}", "Logged events:", events.len())?;
    writeln!(ctx.out, "    {:<35}{:>10}", "unrepaired serviceable events:", unrepaired)?;
    writeln!(ctx.out, "    {:<35}{:>10}", "repaired serviceable events:", repaired)?;
    writeln!(ctx.out, "    {:<35}{:>10}", "informational events:", info)?;
    writeln!(ctx.out, "    {:<35}{:>10}", "repair actions:", repairs)?;
    Ok(EXIT_OK)
}

fn truncate(target: TruncateTarget, force: bool, is_root: bool, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    if !is_root { return Err(CliError::Denied("Must be root to truncate the database!".to_string())); }
    let what = match target { TruncateTarget::Events => "events", TruncateTarget::Notify => "notification tools" };
    if !force && !confirm(ctx, &format!("Are you certain you wish to delete ALL {} from the servicelog?", what))? {
        writeln!(ctx.out, "Operation cancelled.")?;
        return Ok(EXIT_CANCELLED);
    }
    let mut db = open_db(ctx)?;
    let mut deleted = 0usize;
    match target {
        TruncateTarget::Events => {
            for e in db.event_query("")? { db.event_delete(e.id)?; deleted += 1; }
            for r in db.repair_query("")? { db.repair_delete(r.id)?; deleted += 1; }
        }
        TruncateTarget::Notify => {
            for n in db.notify_query("")? { db.notify_delete(n.id)?; deleted += 1; }
        }
    }
    db.close();
    log::info!("truncated {}: {} records", what, deleted);
    writeln!(ctx.out, "Deleted {} records.", deleted)?;
    Ok(EXIT_OK)
}

fn clean(age: u32, force: bool, is_root: bool, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    if !is_root { return Err(CliError::Denied("Must be root to purge older events in the database!".to_string())); }
    if !force {
        let question = format!(
            "Are you certain you wish to perform the following tasks?\n - Delete all repaired serviceable events\n - Delete all informational events older than {age} days\n - Delete all repair actions older than {age} days\n - Delete anything older than 1 year"
        );
        if !confirm(ctx, &question)? {
            writeln!(ctx.out, "Operation cancelled.")?;
            return Ok(EXIT_OK);
        }
    }
    let mut db = open_db(ctx)?;
    let now = Utc::now();
    let span = Duration::days(i64::from(age));
    let year = Duration::days(365);
    let (mut repaired, mut info, mut old, mut repairs) = (0usize, 0usize, 0usize, 0usize);
    for e in db.event_query("")? {
        let counter = if e.serviceable && e.closed {
            &mut repaired
        } else if !e.serviceable && e.time_logged + span < now {
            &mut info
        } else if e.time_logged + year < now {
            &mut old
        } else {
            continue;
        };
        db.event_delete(e.id)?;
        *counter += 1;
    }
    for r in db.repair_query("")? {
        if r.time_logged + span < now {
            db.repair_delete(r.id)?;
            repairs += 1;
        }
    }
    db.close();
    writeln!(ctx.out, "Removed {} repaired serviceable events.", repaired)?;
    writeln!(ctx.out, "Removed {} informational events older than {} days.", info, age)?;
    writeln!(ctx.out, "Removed {} repair actions older than {} days.", repairs, age)?;
    writeln!(ctx.out, "Removed {} other events older than one year.", old)?;
    Ok(EXIT_OK)
}

/// Run with an explicit privilege decision; the binary passes the real euid check.
pub fn execute(args: &ManageArgs, ctx: &mut Context<'_>, is_root: bool) -> Result<i32, CliError> {
    match args.action()? {
        Action::Status => status(ctx),
        Action::Truncate(t) => truncate(t, args.force, is_root, ctx),
        Action::Clean => clean(args.age, args.force, is_root, ctx),
    }
}

impl Tool for ManageArgs {
    const NAME: &'static str = "servicelog_manage";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    fn help_when_bare() -> bool { true }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { execute(self, ctx, cli::running_as_root()) }
}
