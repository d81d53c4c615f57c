use std::path::Path;

use clap::Parser;

use super::{Context, open_db};
use crate::cli::{CommonArgs, Tool};
use crate::error::{CliError, EXIT_OK};
use crate::legacy_filter::{LegacyFilter, TriState, TypeAccumulator, resolve_match};
use crate::model::{Notify, NotifyKind, NotifyMethod};
use crate::print;
use crate::store::{Servicelog, quote};

#[derive(Parser, Debug)]
#[command(
    name = "servicelog_notify",
    version,
    about = "Register tools to be run when events or repair actions are logged",
    after_long_help = "Examples:\n  servicelog_notify --add --command=/usr/local/bin/notify.sh --match='severity>=$ERROR'\n  servicelog_notify --add --command=/usr/local/bin/notify.sh --type='os|ppc64_rtas' --severity=5\n  servicelog_notify --list\n  servicelog_notify --remove --id=3"
)]
pub struct NotifyArgs {
    #[arg(short = 'a', long)]
    pub add: bool,
    #[arg(short = 'r', long)]
    pub remove: bool,
    #[arg(short = 'l', long)]
    pub list: bool,
    /// Like --list, but requires --id or --command
    #[arg(short = 'q', long)]
    pub query: bool,
    /// ID of the registered tool to list or remove
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub id: Option<u64>,
    /// Command to be run when notified
    #[arg(short = 'c', long)]
    pub command: Option<String>,
    /// Notify on events matching this query
    #[arg(short = 'm', long = "match", value_name = "QUERY")]
    pub match_str: Option<String>,
    #[arg(short = 'M', long, value_enum)]
    pub method: Option<NotifyMethod>,
    /// EVENT or REPAIR, or legacy event types joined with '|': os, ppc64_rtas, ppc64_encl
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub types: Vec<String>,
    /// Notify only of events with at least this severity, 1 (lowest) to 7 (fatal)
    #[arg(short = 'E', long, value_parser = clap::value_parser!(u8).range(1..=7))]
    pub severity: Option<u8>,
    #[arg(short = 'R', long = "repair_action", value_enum)]
    pub repair_action: Option<TriState>,
    #[arg(short = 'S', long, value_enum)]
    pub serviceable: Option<TriState>,
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action { Add, Remove, List, Query }

impl NotifyArgs {
    pub fn action(&self) -> Result<Action, CliError> {
        let chosen: Vec<Action> = [(self.add, Action::Add), (self.remove, Action::Remove), (self.list, Action::List), (self.query, Action::Query)]
            .into_iter()
            .filter_map(|(on, a)| on.then_some(a))
            .collect();
        match chosen.as_slice() {
            [] => Err(CliError::usage("One of --add, --remove, --query or --list is required.")),
            [a] => Ok(*a),
            _ => Err(CliError::usage("Only one of the --add, --remove, --query or --list options may be specified.")),
        }
    }

    fn add_flag_count(&self) -> usize {
        [!self.types.is_empty(), self.match_str.is_some(), self.method.is_some(), self.severity.is_some(), self.repair_action.is_some(), self.serviceable.is_some()]
            .iter()
            .filter(|b| **b)
            .count()
    }

    /// Which record kinds the registration covers. Defaults to events.
    pub fn kinds(&self, acc: &TypeAccumulator) -> (bool, bool) {
        let (mut events, mut repairs) = match self.repair_action {
            Some(TriState::Yes) => (false, true),
            Some(TriState::No) => (true, false),
            Some(TriState::All) => (true, true),
            None => (false, false),
        };
        if matches!(self.serviceable, Some(TriState::Yes | TriState::All)) { events = true; }
        events |= acc.wants_events();
        repairs |= acc.wants_repairs();
        if !events && !repairs { events = true; }
        (events, repairs)
    }

    pub fn event_match(&self, acc: &TypeAccumulator) -> String {
        let legacy = LegacyFilter { types: acc.types(), severity: self.severity, serviceable: self.serviceable.unwrap_or_default(), repaired: TriState::All };
        resolve_match(self.match_str.as_deref(), &legacy)
    }
}

/// The first word of `command` must be an executable regular file.
pub fn check_command(command: &str) -> Result<(), CliError> {
    let prog = command.split_whitespace().next().unwrap_or("");
    let meta = std::fs::metadata(Path::new(prog)).map_err(|_| CliError::BadCommand(format!("Command '{}' does not exist.", prog)))?;
    if !meta.is_file() { return Err(CliError::BadCommand(format!("'{}' is not a valid command.", prog))); }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o100 == 0 { return Err(CliError::BadCommand(format!("'{}' does not have execute permission.", prog))); }
    }
    Ok(())
}

fn lookup(db: &Servicelog, id: Option<u64>, command: Option<&str>) -> Result<Vec<Notify>, CliError> {
    if let Some(id) = id {
        return match db.notify_get(id)? {
            Some(n) => Ok(vec![n]),
            None => Err(CliError::NotFound(format!("Could not find a registered notification tool with the specified id ({}).", id))),
        };
    }
    if let Some(cmd) = command {
        let found = db.notify_query(&format!("command = {}", quote(cmd)))?;
        if found.is_empty() { return Err(CliError::NotFound(format!("Could not find a registered notification tool with the specified command ('{}').", cmd))); }
        return Ok(found);
    }
    let found = db.notify_query("id>0")?;
    if found.is_empty() { return Err(CliError::NotFound("There are no registered notification tools.".to_string())); }
    Ok(found)
}

pub fn run(args: &NotifyArgs, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let action = args.action()?;
    let acc = TypeAccumulator::from_values(&args.types);
    acc.log_ignored();
    match action {
        Action::Add => {
            if args.id.is_some() { return Err(CliError::usage("The --id flag may not be used with the --add option.")); }
            let Some(command) = args.command.as_deref() else {
                return Err(CliError::usage("The --command flag must be specified with the --add option."));
            };
            check_command(command)?;
            let (events, repairs) = args.kinds(&acc);
            let method = args.method.unwrap_or_default();
            let mut db = open_db(ctx)?;
            if events {
                let n = Notify::new(NotifyKind::Events, method, command, &args.event_match(&acc));
                let id = db.notify_log(&n).map_err(|e| CliError::log("Could not register the notification tool.", e))?;
                writeln!(ctx.out, "Event Notification Registration successful (id: {})", id)?;
            }
            if repairs {
                let n = Notify::new(NotifyKind::Repairs, method, command, args.match_str.as_deref().unwrap_or(""));
                let id = db.notify_log(&n).map_err(|e| CliError::log("Could not register the notification tool.", e))?;
                writeln!(ctx.out, "Repair Notification Registration successful (id: {})", id)?;
            }
            db.close();
        }
        Action::List | Action::Query => {
            if (args.command.is_some() && args.id.is_some()) || args.add_flag_count() > 0 {
                return Err(CliError::usage("Only one of the --command or --id flags may be specified with the --list or --query option."));
            }
            if action == Action::Query && args.command.is_none() && args.id.is_none() {
                return Err(CliError::usage("--query must be accompanied by --command='command path' or --id=."));
            }
            let db = open_db(ctx)?;
            let tools = lookup(&db, args.id, args.command.as_deref())?;
            db.close();
            print::print_notify(ctx.out, &tools, ctx.tz)?;
        }
        Action::Remove => {
            if args.command.is_none() && args.id.is_none() {
                return Err(CliError::usage("At least one of the --command or --id flags must be specified with the --remove option."));
            }
            let mut db = open_db(ctx)?;
            let tools = lookup(&db, args.id, args.command.as_deref())?;
            for t in &tools { db.notify_delete(t.id)?; }
            db.close();
            log::info!("removed {} notification tool(s)", tools.len());
        }
    }
    Ok(EXIT_OK)
}

impl Tool for NotifyArgs {
    const NAME: &'static str = "servicelog_notify";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    fn help_when_bare() -> bool { true }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { run(self, ctx) }
}
