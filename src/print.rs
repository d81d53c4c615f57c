use std::io::Write;
use std::sync::OnceLock;

use is_terminal::IsTerminal;

use crate::date::{self, TimeZone};
use crate::model::{Event, Notify, RepairAction, severity_name};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

/// Decide once per process whether stdout gets ANSI colors.
pub fn init_color(no_color: bool) {
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let _ = ENABLE_COLOR.set(color_default && !no_color);
}

pub fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

fn sev_code(sev: u8) -> &'static str { match sev { 7 => "1;31", 6 | 5 => "31", 4 => "33", 3 => "36", _ => "37" } }

pub fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn yes_no(b: bool) -> &'static str { if b { "Yes" } else { "No" } }

fn field(out: &mut dyn Write, label: &str, value: &str) -> std::io::Result<()> {
    writeln!(out, "{:<20}{}", format!("{}:", label), value)
}

/// Print events. Verbosity 0 prints a header block per event; anything
/// higher adds the description and callouts.
pub fn print_events(out: &mut dyn Write, events: &[Event], verbosity: u8, tz: TimeZone) -> std::io::Result<()> {
    for (i, e) in events.iter().enumerate() {
        if i > 0 { writeln!(out)?; }
        print_event(out, e, verbosity, tz)?;
    }
    Ok(())
}

pub fn print_event(out: &mut dyn Write, e: &Event, verbosity: u8, tz: TimeZone) -> std::io::Result<()> {
    field(out, "Servicelog ID", &e.id.to_string())?;
    field(out, "Log Timestamp", &date::display(e.time_logged, tz))?;
    field(out, "Event Timestamp", &date::display(e.time_event, tz))?;
    if verbosity > 0 { field(out, "Update Timestamp", &date::display(e.time_last_update, tz))?; }
    field(out, "Type", e.event_type.label())?;
    field(out, "Severity", &paint(&format!("{} ({})", e.severity, severity_name(e.severity)), sev_code(e.severity)))?;
    if verbosity > 0 {
        field(out, "Platform", &e.platform)?;
        field(out, "Model/Serial", &format!("{}/{}", e.machine_model, e.machine_serial))?;
        field(out, "Node Name", &e.nodename)?;
    }
    field(out, "Reference Code", &e.refcode)?;
    field(out, "Serviceable Event", yes_no(e.serviceable))?;
    field(out, "Predictive Event", yes_no(e.predictive))?;
    let disposition = if !e.serviceable { "Informational".to_string() } else if e.closed { format!("Repaired (repair action {})", e.repair) } else { paint("Open", "1;33") };
    field(out, "Status", &disposition)?;
    if verbosity == 0 {
        field(out, "Description", &truncate(&e.description.replace('\n', " "), 60))?;
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Description:")?;
    writeln!(out, "{}", e.description)?;
    for (n, c) in e.callouts.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "<< Callout {} >>", n + 1)?;
        field(out, "Procedure", &c.procedure)?;
        field(out, "Location", &c.location)?;
        field(out, "FRU", &c.fru)?;
        field(out, "Serial", &c.serial)?;
        field(out, "CCIN", &c.ccin)?;
    }
    Ok(())
}

pub fn print_repairs(out: &mut dyn Write, repairs: &[RepairAction], tz: TimeZone) -> std::io::Result<()> {
    for (i, r) in repairs.iter().enumerate() {
        if i > 0 { writeln!(out)?; }
        field(out, "Servicelog ID", &r.id.to_string())?;
        field(out, "Log Timestamp", &date::display(r.time_logged, tz))?;
        field(out, "Repair Timestamp", &date::display(r.time_repair, tz))?;
        field(out, "Location", &r.location)?;
        field(out, "Procedure", &r.procedure)?;
        if !r.notes.is_empty() { field(out, "Notes", &r.notes)?; }
    }
    Ok(())
}

pub fn print_notify(out: &mut dyn Write, tools: &[Notify], tz: TimeZone) -> std::io::Result<()> {
    for (i, n) in tools.iter().enumerate() {
        if i > 0 { writeln!(out)?; }
        field(out, "Servicelog ID", &n.id.to_string())?;
        field(out, "Log Timestamp", &date::display(n.time_logged, tz))?;
        field(out, "Last Update", &date::display(n.time_last_update, tz))?;
        field(out, "Notification Type", n.kind.label())?;
        field(out, "Command", &n.command)?;
        field(out, "Method", n.method.describe())?;
        field(out, "Match", &n.match_str)?;
    }
    Ok(())
}

pub fn write_json(out: &mut dyn Write, events: &[Event]) -> std::io::Result<()> {
    let s = serde_json::to_string_pretty(events).map_err(std::io::Error::other)?;
    writeln!(out, "{}", s)
}

pub fn write_csv(path: &str, events: &[Event], tz: TimeZone) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["id", "time_event", "type", "severity", "refcode", "serviceable", "closed", "description"])?;
    for e in events {
        wtr.write_record([
            e.id.to_string(),
            date::display(e.time_event, tz),
            e.event_type.label().to_string(),
            severity_name(e.severity).to_string(),
            e.refcode.clone(),
            (e.serviceable as u8).to_string(),
            (e.closed as u8).to_string(),
            e.description.replace('\n', " "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_ndjson(path: &str, events: &[Event]) -> Result<(), std::io::Error> {
    let mut file = std::fs::File::create(path)?;
    for e in events {
        let obj = serde_json::json!({
            "id": e.id,
            "time_event": e.time_event.to_rfc3339(),
            "type": e.event_type.label(),
            "severity": severity_name(e.severity),
            "refcode": e.refcode,
            "serviceable": e.serviceable,
            "closed": e.closed,
            "callouts": e.callouts.len(),
            "description": e.description,
        });
        writeln!(file, "{}", obj)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Callout, EventType, SEV_ERROR};
    use chrono::{TimeZone as _, Utc};

    fn sample() -> Event {
        let mut e = Event::new(EventType::Os, SEV_ERROR, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        e.id = 42;
        e.refcode = "B1234".into();
        e.serviceable = true;
        e.description = "Fan failure detected in the processor enclosure. Replace the fan assembly.".into();
        e.callouts.push(Callout { location: "U1-P1-F2".into(), procedure: "FSPSP04".into(), ..Default::default() });
        e
    }

    fn render(verbosity: u8) -> String {
        let mut out = Vec::new();
        print_events(&mut out, &[sample()], verbosity, TimeZone::Utc).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header_form_is_compact() {
        let s = render(0);
        assert!(s.contains("Servicelog ID:      42"));
        assert!(s.contains("Severity:           6 (ERROR)"));
        assert!(s.contains("Event Timestamp:    2024-01-02 03:04:05 UTC"));
        assert!(s.contains("Status:             Open"));
        assert!(s.contains("..."));
        assert!(!s.contains("Callout"));
    }

    #[test]
    fn verbose_form_lists_callouts() {
        let s = render(1);
        assert!(s.contains("<< Callout 1 >>"));
        assert!(s.contains("Location:           U1-P1-F2"));
        assert!(s.contains("Replace the fan assembly."));
    }

    #[test]
    fn truncate_handles_multibyte() {
        assert_eq!(truncate("ééééé", 3), "ééé...");
        assert_eq!(truncate("abc", 5), "abc");
    }

    #[test]
    fn ndjson_writes_lines() {
        let p = std::env::temp_dir().join(format!("servicelog_print_{}.ndjson", std::process::id()));
        write_ndjson(&p.to_string_lossy(), &[sample(), sample()]).unwrap();
        let data = std::fs::read_to_string(&p).unwrap();
        assert_eq!(data.lines().count(), 2);
        let v: serde_json::Value = serde_json::from_str(data.lines().next().unwrap()).unwrap();
        assert_eq!(v["severity"], "ERROR");
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn csv_has_header_and_rows() {
        let p = std::env::temp_dir().join(format!("servicelog_print_{}.csv", std::process::id()));
        write_csv(&p.to_string_lossy(), &[sample()], TimeZone::Utc).unwrap();
        let data = std::fs::read_to_string(&p).unwrap();
        assert!(data.starts_with("id,time_event,type,severity"));
        assert!(data.contains("42,2024-01-02 03:04:05 UTC,OS,ERROR,B1234,1,0"));
        let _ = std::fs::remove_file(&p);
    }
}
