use clap::{ArgAction, Parser, ValueEnum};
use comfy_table::{CellAlignment, ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use super::{Context, open_db};
use crate::cli::{CommonArgs, Tool};
use crate::error::{CliError, EXIT_OK};
use crate::model::{Event, EventType};
use crate::print::{self, paint};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFmt {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "v1_servicelog",
    version,
    about = "Query the servicelog event database",
    after_long_help = "Examples:\n  v1_servicelog --dump\n  v1_servicelog --query 'severity>=$WARNING and serviceable=1'\n  v1_servicelog --query \"time_event>'2024-02-08'\" --output json"
)]
pub struct QueryArgs {
    /// Print every logged event
    #[arg(short = 'd', long = "dump", conflicts_with = "query")]
    pub dump: bool,
    /// Print the events selected by a match string
    #[arg(short = 'q', long = "query", value_name = "QUERY")]
    pub query: Option<String>,
    /// Accepted for compatibility; has no effect
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
    #[arg(long, value_enum, default_value_t = OutputFmt::Text)]
    pub output: OutputFmt,
    /// Also write the selected events to a CSV file
    #[arg(long, value_name = "PATH")]
    pub csv_path: Option<String>,
    /// Also write the selected events as newline-delimited JSON
    #[arg(long, value_name = "PATH")]
    pub ndjson_path: Option<String>,
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Per-type counters shown by the statistics view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub info: usize,
}

impl TypeCounts {
    fn add(&mut self, e: &Event) {
        self.total += 1;
        if e.is_open() { self.open += 1; } else if e.serviceable { self.closed += 1; } else { self.info += 1; }
    }

    fn merge(&mut self, o: &TypeCounts) {
        self.total += o.total;
        self.open += o.open;
        self.closed += o.closed;
        self.info += o.info;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub by_type: Vec<(EventType, TypeCounts)>,
    pub repairs: usize,
    pub notify_tools: usize,
}

impl Stats {
    pub fn from_events(events: &[Event]) -> Self {
        let mut by_type: Vec<(EventType, TypeCounts)> = EventType::ALL.iter().map(|t| (*t, TypeCounts::default())).collect();
        for e in events {
            if let Some((_, c)) = by_type.iter_mut().find(|(t, _)| *t == e.event_type) { c.add(e); }
        }
        Self { by_type, ..Default::default() }
    }

    pub fn totals(&self) -> TypeCounts {
        let mut t = TypeCounts::default();
        for (_, c) in &self.by_type { t.merge(c); }
        t
    }

    pub fn open_line(&self) -> String {
        match self.totals().open {
            0 => "There are no open events that require action.".to_string(),
            1 => "There is 1 open event requiring action.".to_string(),
            n => format!("There are {} open events requiring action.", n),
        }
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(["Type", "Total", "Open", "Closed", "Info"].iter().map(|h| paint(h, "1")).collect::<Vec<_>>());
        let row = |label: String, c: &TypeCounts| vec![label, c.total.to_string(), c.open.to_string(), c.closed.to_string(), c.info.to_string()];
        for (t, c) in self.by_type.iter().filter(|(_, c)| c.total > 0) {
            table.add_row(row(t.label().to_string(), c));
        }
        table.add_row(row(paint("Total", "1"), &self.totals()));
        for col in 1..5 {
            if let Some(column) = table.column_mut(col) { column.set_cell_alignment(CellAlignment::Right); }
        }
        table
    }
}

pub fn run(args: &QueryArgs, ctx: &mut Context<'_>) -> Result<i32, CliError> {
    let db = open_db(ctx)?;
    let selection = if args.dump { Some(String::new()) } else { args.query.clone() };
    let Some(q) = selection else {
        let mut stats = Stats::from_events(&db.event_query("")?);
        stats.repairs = db.repair_query("")?.len();
        stats.notify_tools = db.notify_query("")?.len();
        db.close();
        writeln!(ctx.out, "{}\n", paint("Servicelog Statistics:", "1;36"))?;
        writeln!(ctx.out, "{}\n", stats.open_line())?;
        writeln!(ctx.out, "Summary of Logged Events:\n")?;
        writeln!(ctx.out, "{}\n", stats.table())?;
        writeln!(ctx.out, "Logged Repair Actions:         {}", stats.repairs)?;
        writeln!(ctx.out, "Registered Notification Tools: {}", stats.notify_tools)?;
        return Ok(EXIT_OK);
    };
    let events = db.event_query(&q)?;
    db.close();
    log::info!("query '{}' selected {} events", q, events.len());
    match args.output {
        OutputFmt::Text => print::print_events(ctx.out, &events, 1, ctx.tz)?,
        OutputFmt::Json => print::write_json(ctx.out, &events)?,
    }
    if let Some(p) = args.csv_path.as_ref() && let Err(e) = print::write_csv(p, &events, ctx.tz) { log::warn!("CSV export to {} failed: {}", p, e); }
    if let Some(p) = args.ndjson_path.as_ref() && let Err(e) = print::write_ndjson(p, &events) { log::warn!("NDJSON export to {} failed: {}", p, e); }
    Ok(EXIT_OK)
}

impl Tool for QueryArgs {
    const NAME: &'static str = "v1_servicelog";
    fn common(&self) -> &CommonArgs { &self.common }
    fn common_mut(&mut self) -> &mut CommonArgs { &mut self.common }
    fn run(&self, ctx: &mut Context<'_>) -> Result<i32, CliError> { run(self, ctx) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{run as run_tool, temp_db};
    use crate::model::{SEV_ERROR, SEV_INFO, SEV_WARNING};
    use crate::store::Servicelog;
    use chrono::Utc;

    fn seed(path: &std::path::Path) {
        let mut db = Servicelog::open(path).unwrap();
        let mut a = Event::new(EventType::Os, SEV_ERROR, Utc::now());
        a.serviceable = true;
        a.refcode = "#OPEN".into();
        db.event_log(&a).unwrap();
        let mut b = Event::new(EventType::Rtas, SEV_WARNING, Utc::now());
        b.serviceable = true;
        b.closed = true;
        db.event_log(&b).unwrap();
        db.event_log(&Event::new(EventType::Os, SEV_INFO, Utc::now())).unwrap();
        db.close();
    }

    #[test]
    fn statistics_view() {
        let p = temp_db("v1_stats");
        seed(&p);
        let (res, out) = run_tool::<QueryArgs>(&["v1_servicelog"], &p);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("There is 1 open event requiring action."));
        assert!(out.contains("Logged Repair Actions:         0"));
        assert!(out.contains("Registered Notification Tools: 0"));
        assert!(out.contains("RTAS"));
        assert!(!out.contains("Enclosure"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn counts_by_disposition() {
        let mut e = Event::new(EventType::Bmc, SEV_ERROR, Utc::now());
        e.serviceable = true;
        let mut closed = e.clone();
        closed.closed = true;
        let stats = Stats::from_events(&[e.clone(), e, closed, Event::new(EventType::Bmc, SEV_INFO, Utc::now())]);
        assert_eq!(stats.totals(), TypeCounts { total: 4, open: 2, closed: 1, info: 1 });
        assert_eq!(stats.open_line(), "There are 2 open events requiring action.");
        assert_eq!(Stats::default().open_line(), "There are no open events that require action.");
    }

    #[test]
    fn query_prints_matching_events() {
        let p = temp_db("v1_query");
        seed(&p);
        let (res, out) = run_tool::<QueryArgs>(&["v1_servicelog", "-q", "refcode='#OPEN'"], &p);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("#OPEN"));
        assert_eq!(out.matches("Servicelog ID:").count(), 1);
        let (_, out) = run_tool::<QueryArgs>(&["v1_servicelog", "--dump"], &p);
        assert_eq!(out.matches("Servicelog ID:").count(), 3);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn json_output_parses() {
        let p = temp_db("v1_json");
        seed(&p);
        let (_, out) = run_tool::<QueryArgs>(&["v1_servicelog", "-q", "severity>=$WARNING", "--output", "json"], &p);
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn bad_query_exits_with_database_status() {
        let p = temp_db("v1_bad");
        let (res, _) = run_tool::<QueryArgs>(&["v1_servicelog", "-q", "nonsense=="], &p);
        assert_eq!(res.unwrap_err().exit_code(), 2);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn dump_and_query_conflict() {
        let err = QueryArgs::try_parse_from(["v1_servicelog", "-d", "-q", "id=1"]).unwrap_err();
        assert_eq!(crate::cli::clap_exit_code(err.kind()), 1);
    }
}
