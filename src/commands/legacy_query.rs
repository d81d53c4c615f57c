use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};

use super::{Context, open_db};
use crate::cli::{CommonArgs, Tool};
use crate::date;
use crate::error::{CliError, EXIT_OK};
use crate::legacy_filter::{LegacyFilter, TriState, TypeAccumulator};
use crate::print;

#[derive(Parser, Debug)]
#[command(name = "v29_servicelog", version, disable_version_flag = true, about = "Query the servicelog with version 0.2.9 style flags")]
pub struct LegacyQueryArgs {
    /// Find the servicelog event with this key
    #[arg(short = 'i', long = "id", value_parser = clap::value_parser!(u64).range(1..))]
    pub id: Option<u64>,
    /// Event type(s) to query on: os, app, ppc64_rtas, ppc64_encl, all (repeatable)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub types: Vec<String>,
    /// Beginning of time window
    #[arg(short = 's', long = "start_time", value_name = "TIME")]
    pub start_time: Option<String>,
    /// End of time window
    #[arg(short = 'e', long = "end_time", value_name = "TIME")]
    pub end_time: Option<String>,
    /// Search for repair actions?
    #[arg(short = 'R', long = "repair_action", value_enum)]
    pub repair_action: Option<TriState>,
    /// Search for serviceable events?
    #[arg(short = 'S', long = "serviceable", value_enum)]
    pub serviceable: Option<TriState>,
    /// Search for repaired events?
    #[arg(short = 'r', long = "event_repaired", value_enum)]
    pub event_repaired: Option<TriState>,
    /// Minimum severity, 1 (lowest) to 7 (fatal)
    #[arg(short = 'E', long = "severity", value_parser = clap::value_parser!(u8).range(1..=7))]
    pub severity: Option<u8>,
    /// Servicelog location (if not default)
    #[arg(short = 'l', long = "location", value_name = "PATH")]
    pub location: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    /// Print version
    #[arg(short = 'V', long = "Version", action = ArgAction::Version)]
    pub version: Option<bool>,
    #[command(flatten)]
    pub common: CommonArgs,
}

impl LegacyQueryArgs {
    fn query_flag_count(&self) -> usize {
        [
            !self.types.is_empty(),
            self.start_time.is_some(),
            self.end_time.is_some(),
            self.repair_action.is_some(),
            self.serviceable.is_some(),
            self.event_repaired.is_some(),
            self.severity.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn filter(&self, acc: &TypeAccumulator) -> LegacyFilter {
        LegacyFilter {
            types: acc.types(),
            severity: self.severity,
            serviceable: self.serviceable.unwrap_or_default(),
            repaired: self.event_repaired.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Window { start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>> }

impl Window {
    fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }
}

pub fn run(args: &LegacyQueryArgs, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let others = args.query_flag_count();
    if args.id.is_some() && others > 0 {
        return Err(CliError::usage("The --id flag is mutually exclusive with all other query flags."));
    }
    if args.id.is_none() && others == 0 {
        return Err(CliError::usage("One of the query flags must be specified to query the servicelog."));
    }
    let parse = |s: &Option<String>| s.as_deref().map(|v| date::parse_date(v, ctx.tz)).transpose();
    let window = Window { start: parse(&args.start_time)?, end: parse(&args.end_time)? };

    let db = open_db(ctx)?;
    if let Some(id) = args.id {
        let event = db.event_get(id)?.ok_or_else(|| CliError::Lookup(format!("No event with id {} in the servicelog.", id)))?;
        db.close();
        print::print_event(ctx.out, &event, args.verbose, ctx.tz)?;
        writeln!(ctx.out)?;
        return Ok(EXIT_OK);
    }

    let (want_events, want_repairs) = match args.repair_action {
        Some(TriState::Yes) => (false, true),
        Some(TriState::All) => (true, true),
        Some(TriState::No) | None => (true, false),
    };
    let acc = TypeAccumulator::from_values(&args.types);
    acc.log_ignored();
    if want_events && acc.selects_nothing() {
        log::info!("requested event types have no counterpart in the servicelog; no events listed");
    } else if want_events {
        let filter = args.filter(&acc).to_match();
        log::debug!("legacy selectors translated to '{}'", filter);
        let events: Vec<_> = db.event_query(&filter)?.into_iter().filter(|e| window.contains(e.time_event)).collect();
        for e in &events {
            print::print_event(ctx.out, e, args.verbose, ctx.tz)?;
            writeln!(ctx.out)?;
        }
    }
    if want_repairs {
        let repairs: Vec<_> = db.repair_query("")?.into_iter().filter(|r| window.contains(r.time_repair)).collect();
        for r in &repairs {
            print::print_repairs(ctx.out, std::slice::from_ref(r), ctx.tz)?;
            writeln!(ctx.out)?;
        }
    }
    db.close();
    Ok(EXIT_OK)
}

impl Tool for LegacyQueryArgs {
    const NAME: &'static str = "v29_servicelog";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    fn verbose(&self) -> u8 { self.verbose }
    fn db_override(&self) -> Option<&Path> { self.location.as_deref() }
    fn help_when_bare() -> bool { true }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { run(self, ctx) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{run as run_tool, temp_db};
    use crate::model::{Event, EventType, RepairAction, SEV_ERROR, SEV_INFO, SEV_WARNING};
    use crate::store::Servicelog;
    use chrono::TimeZone as _;

    fn seed(path: &Path) -> Vec<u64> {
        let mut db = Servicelog::open(path).unwrap();
        let at = |d| Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap();
        let mut ids = vec![];
        let mut os = Event::new(EventType::Os, SEV_ERROR, at(5));
        os.serviceable = true;
        os.refcode = "#OS_ERR".into();
        ids.push(db.event_log(&os).unwrap());
        let mut encl = Event::new(EventType::Enclosure, SEV_WARNING, at(10));
        encl.refcode = "#ENCL_WARN".into();
        ids.push(db.event_log(&encl).unwrap());
        let mut info = Event::new(EventType::Rtas, SEV_INFO, at(20));
        info.refcode = "#RTAS_INFO".into();
        ids.push(db.event_log(&info).unwrap());
        db.repair_log(&RepairAction::new("U1-P9", "swap card", at(15))).unwrap();
        db.close();
        ids
    }

    #[test]
    fn id_excludes_other_flags() {
        let p = temp_db("v29_ex");
        let (res, _) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--id", "1", "--type", "os"], &p);
        assert_eq!(res.unwrap_err().exit_code(), 1);
        let (res, _) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "-v"], &p);
        assert_eq!(res.unwrap_err().exit_code(), 1);
    }

    #[test]
    fn lookup_by_id() {
        let p = temp_db("v29_id");
        let ids = seed(&p);
        let (res, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--id", &ids[1].to_string()], &p);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("#ENCL_WARN"));
        let (res, _) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--id", "999"], &p);
        assert_eq!(res.unwrap_err().exit_code(), 2);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn type_and_severity_selectors() {
        let p = temp_db("v29_sel");
        seed(&p);
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--type", "os", "--type", "ppc64_encl"], &p);
        assert!(out.contains("#OS_ERR") && out.contains("#ENCL_WARN") && !out.contains("#RTAS_INFO"));
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--severity", "5"], &p);
        assert!(out.contains("#OS_ERR") && !out.contains("#ENCL_WARN"));
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--serviceable", "no"], &p);
        assert!(!out.contains("#OS_ERR") && out.contains("#RTAS_INFO"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn app_type_lists_no_events() {
        let p = temp_db("v29_app");
        seed(&p);
        let (res, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--type", "app"], &p);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out.matches("Servicelog ID:").count(), 0);
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--type", "app", "--type", "all"], &p);
        assert_eq!(out.matches("Servicelog ID:").count(), 3);
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--type", "app", "--repair_action", "all"], &p);
        assert!(out.contains("swap card") && !out.contains("#OS_ERR"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn time_window_bounds_events() {
        let p = temp_db("v29_win");
        seed(&p);
        let start = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap().timestamp().to_string();
        let end = Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap().timestamp().to_string();
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--start_time", &start, "--end_time", &end], &p);
        assert!(out.contains("#ENCL_WARN"));
        assert_eq!(out.matches("Servicelog ID:").count(), 1);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn repair_action_selects_record_kind() {
        let p = temp_db("v29_ra");
        seed(&p);
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--repair_action", "yes"], &p);
        assert!(out.contains("swap card"));
        assert!(!out.contains("#OS_ERR"));
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "--repair_action", "all"], &p);
        assert!(out.contains("swap card") && out.contains("#OS_ERR"));
        let (_, out) = run_tool::<LegacyQueryArgs>(&["v29_servicelog", "-R", "no"], &p);
        assert!(!out.contains("swap card") && out.contains("#OS_ERR"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn flag_values_are_validated() {
        for argv in [
            ["v29_servicelog", "--serviceable", "maybe"],
            ["v29_servicelog", "--severity", "0"],
            ["v29_servicelog", "--severity", "8"],
            ["v29_servicelog", "--id", "0"],
        ] {
            let err = LegacyQueryArgs::try_parse_from(argv).unwrap_err();
            assert_eq!(crate::cli::clap_exit_code(err.kind()), 1);
        }
        let err = LegacyQueryArgs::try_parse_from(["v29_servicelog", "-V"]).unwrap_err();
        assert_eq!(crate::cli::clap_exit_code(err.kind()), 0);
    }
}
