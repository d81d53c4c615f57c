use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::model::{Callout, Event, EventType, Notify, NotifyKind, NotifyMethod, RepairAction};

pub const DEFAULT_DB_PATH: &str = "/var/lib/servicelog/servicelog.db";

// Stored as UTC text so that `time_event>'2008-02-08'` compares as a date.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not open servicelog database {path}: {source}")]
    Open { path: String, #[source] source: rusqlite::Error },
    #[error("could not create database directory {path}: {source}")]
    Dir { path: String, #[source] source: std::io::Error },
    #[error("invalid query \"{query}\": {source}")]
    Query { query: String, #[source] source: rusqlite::Error },
    #[error("unknown constant ${0} in query")]
    UnknownConstant(String),
    #[error("corrupt {table} record {id}: {reason}")]
    Corrupt { table: &'static str, id: i64, reason: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct Servicelog {
    conn: Connection,
}

impl Servicelog {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() && !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Dir { path: dir.to_string_lossy().into_owned(), source })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open { path: path.to_string_lossy().into_owned(), source })?;
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let slog = Self { conn };
        slog.create_tables()?;
        log::debug!("opened servicelog database {}", path.to_string_lossy());
        Ok(slog)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let slog = Self { conn };
        slog.create_tables()?;
        Ok(slog)
    }

    pub fn close(self) {
        if let Err((_, e)) = self.conn.close() { log::warn!("closing servicelog database failed: {}", e); }
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time_logged TEXT NOT NULL,
                time_event TEXT NOT NULL,
                time_last_update TEXT NOT NULL,
                type INTEGER NOT NULL,
                severity INTEGER NOT NULL,
                platform TEXT NOT NULL DEFAULT '',
                machine_serial TEXT NOT NULL DEFAULT '',
                machine_model TEXT NOT NULL DEFAULT '',
                nodename TEXT NOT NULL DEFAULT '',
                refcode TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                serviceable INTEGER NOT NULL DEFAULT 0,
                predictive INTEGER NOT NULL DEFAULT 0,
                closed INTEGER NOT NULL DEFAULT 0,
                repair INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS callouts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                procedure TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                fru TEXT NOT NULL DEFAULT '',
                serial TEXT NOT NULL DEFAULT '',
                ccin TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_callouts_event ON callouts(event_id);
            CREATE INDEX IF NOT EXISTS idx_callouts_location ON callouts(location);

            CREATE TABLE IF NOT EXISTS repair_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time_logged TEXT NOT NULL,
                time_repair TEXT NOT NULL,
                procedure TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                platform TEXT NOT NULL DEFAULT '',
                machine_serial TEXT NOT NULL DEFAULT '',
                machine_model TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time_logged TEXT NOT NULL,
                time_last_update TEXT NOT NULL,
                notify INTEGER NOT NULL,
                command TEXT NOT NULL,
                method INTEGER NOT NULL,
                match TEXT NOT NULL DEFAULT ''
            );",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn event_query(&self, query: &str) -> Result<Vec<Event>> {
        let sql = select_sql(
            "SELECT id, time_logged, time_event, time_last_update, type, severity, platform, machine_serial, machine_model, nodename, refcode, description, serviceable, predictive, closed, repair FROM events",
            query,
        )?;
        let mut stmt = self.conn.prepare(&sql).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let rows = stmt.query_map([], row_to_event).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let mut events = Vec::new();
        for r in rows { events.push(r??); }
        for e in &mut events { e.callouts = self.callouts_for(e.id)?; }
        Ok(events)
    }

    pub fn event_get(&self, id: u64) -> Result<Option<Event>> {
        Ok(self.event_query(&format!("id={}", id))?.into_iter().next())
    }

    fn callouts_for(&self, event_id: u64) -> Result<Vec<Callout>> {
        let mut stmt = self.conn.prepare("SELECT procedure, location, fru, serial, ccin FROM callouts WHERE event_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![event_id as i64], |row| {
            Ok(Callout { procedure: row.get(0)?, location: row.get(1)?, fru: row.get(2)?, serial: row.get(3)?, ccin: row.get(4)? })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert an event; returns its new id.
    pub fn event_log(&mut self, event: &Event) -> Result<u64> {
        let now = fmt_ts(Utc::now());
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO events (time_logged, time_event, time_last_update, type, severity, platform, machine_serial, machine_model, nodename, refcode, description, serviceable, predictive, closed, repair)
             VALUES (?1, ?2, ?1, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &now,
                fmt_ts(event.time_event),
                event.event_type.code(),
                event.severity,
                &event.platform,
                &event.machine_serial,
                &event.machine_model,
                &event.nodename,
                &event.refcode,
                &event.description,
                event.serviceable,
                event.predictive,
                event.closed,
                event.repair as i64,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for c in &event.callouts {
            tx.execute(
                "INSERT INTO callouts (event_id, procedure, location, fru, serial, ccin) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, &c.procedure, &c.location, &c.fru, &c.serial, &c.ccin],
            )?;
        }
        tx.commit()?;
        log::info!("logged event {} (type {}, severity {})", id, event.event_type.label(), event.severity);
        Ok(id as u64)
    }

    pub fn event_delete(&mut self, id: u64) -> Result<()> {
        let n = self.conn.execute("DELETE FROM events WHERE id = ?1", params![id as i64])?;
        log::debug!("deleted event {} ({} rows)", id, n);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Repair actions
    // -----------------------------------------------------------------------

    pub fn repair_query(&self, query: &str) -> Result<Vec<RepairAction>> {
        let sql = select_sql(
            "SELECT id, time_logged, time_repair, procedure, location, platform, machine_serial, machine_model, notes FROM repair_actions",
            query,
        )?;
        let mut stmt = self.conn.prepare(&sql).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let rows = stmt.query_map([], row_to_repair).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let mut out = Vec::new();
        for r in rows { out.push(r??); }
        Ok(out)
    }

    /// Insert a repair action and close every open serviceable event with a
    /// callout at the repaired location. Returns the new id and the events
    /// that were closed.
    pub fn repair_log(&mut self, ra: &RepairAction) -> Result<(u64, Vec<Event>)> {
        let now = fmt_ts(Utc::now());
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO repair_actions (time_logged, time_repair, procedure, location, platform, machine_serial, machine_model, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![&now, fmt_ts(ra.time_repair), &ra.procedure, &ra.location, &ra.platform, &ra.machine_serial, &ra.machine_model, &ra.notes],
        )?;
        let id = tx.last_insert_rowid();
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT e.id FROM events e JOIN callouts c ON c.event_id = e.id
                 WHERE e.serviceable = 1 AND e.closed = 0 AND c.location = ?1 ORDER BY e.id",
            )?;
            let rows = stmt.query_map(params![&ra.location], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        for eid in &ids {
            tx.execute("UPDATE events SET closed = 1, repair = ?1, time_last_update = ?2 WHERE id = ?3", params![id, &now, eid])?;
        }
        tx.commit()?;
        log::info!("logged repair action {} at {}; closed {} events", id, ra.location, ids.len());
        let mut repaired = Vec::with_capacity(ids.len());
        for eid in ids {
            if let Some(e) = self.event_get(eid as u64)? { repaired.push(e); }
        }
        Ok((id as u64, repaired))
    }

    pub fn repair_delete(&mut self, id: u64) -> Result<()> {
        self.conn.execute("DELETE FROM repair_actions WHERE id = ?1", params![id as i64])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notification tools
    // -----------------------------------------------------------------------

    pub fn notify_query(&self, query: &str) -> Result<Vec<Notify>> {
        let sql = select_sql(
            "SELECT id, time_logged, time_last_update, notify, command, method, match FROM notifications",
            query,
        )?;
        let mut stmt = self.conn.prepare(&sql).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let rows = stmt.query_map([], row_to_notify).map_err(|source| StoreError::Query { query: query.to_string(), source })?;
        let mut out = Vec::new();
        for r in rows { out.push(r??); }
        Ok(out)
    }

    pub fn notify_get(&self, id: u64) -> Result<Option<Notify>> {
        let mut stmt = self.conn.prepare("SELECT id, time_logged, time_last_update, notify, command, method, match FROM notifications WHERE id = ?1")?;
        let found = stmt.query_row(params![id as i64], row_to_notify).optional()?;
        found.transpose()
    }

    pub fn notify_log(&mut self, notify: &Notify) -> Result<u64> {
        let now = fmt_ts(Utc::now());
        self.conn.execute(
            "INSERT INTO notifications (time_logged, time_last_update, notify, command, method, match) VALUES (?1, ?1, ?2, ?3, ?4, ?5)",
            params![&now, notify.kind.code(), &notify.command, notify.method.code(), &notify.match_str],
        )?;
        let id = self.conn.last_insert_rowid();
        log::info!("registered notification tool {} ({})", id, notify.command);
        Ok(id as u64)
    }

    pub fn notify_delete(&mut self, id: u64) -> Result<()> {
        self.conn.execute("DELETE FROM notifications WHERE id = ?1", params![id as i64])?;
        log::info!("removed notification tool {}", id);
        Ok(())
    }
}

fn select_sql(base: &str, query: &str) -> Result<String> {
    let q = expand_constants(query)?;
    if q.trim().is_empty() { Ok(format!("{} ORDER BY id", base)) } else { Ok(format!("{} WHERE {} ORDER BY id", base, q)) }
}

fn constant_value(name: &str) -> Option<i64> {
    let v = match name {
        "DEBUG" => 1, "INFO" => 2, "EVENT" => 3, "WARNING" => 4, "ERROR_LOCAL" => 5, "ERROR" => 6, "FATAL" => 7,
        "BASIC" => EventType::Basic.code(), "OS" => EventType::Os.code(), "RTAS" => EventType::Rtas.code(),
        "ENCLOSURE" => EventType::Enclosure.code(), "BMC" => EventType::Bmc.code(),
        "EVENTS" => NotifyKind::Events.code(), "REPAIRS" => NotifyKind::Repairs.code(),
        _ => return None,
    };
    Some(v)
}

/// Replace `$NAME` constants with their numeric codes. Text inside single
/// quotes is left alone.
pub fn expand_constants(query: &str) -> Result<String> {
    static CONST_RE: OnceLock<Regex> = OnceLock::new();
    let re = CONST_RE.get_or_init(|| Regex::new(r"\$([A-Za-z_]+)").unwrap_or_else(|_| unreachable!()));
    let mut out = String::with_capacity(query.len());
    for (i, part) in query.split('\'').enumerate() {
        if i > 0 { out.push('\''); }
        if i % 2 == 1 { out.push_str(part); continue; }
        let mut last = 0;
        for cap in re.captures_iter(part) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else { continue };
            let v = constant_value(&name.as_str().to_ascii_uppercase()).ok_or_else(|| StoreError::UnknownConstant(name.as_str().to_string()))?;
            out.push_str(&part[last..whole.start()]);
            out.push_str(&v.to_string());
            last = whole.end();
        }
        out.push_str(&part[last..]);
    }
    Ok(out)
}

/// Quote a value for use inside a match string.
pub fn quote(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

pub fn fmt_ts(t: DateTime<Utc>) -> String { t.format(TS_FORMAT).to_string() }

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).ok().map(|n| n.and_utc())
}

fn ts_col(row: &Row<'_>, idx: usize, table: &'static str, id: i64) -> rusqlite::Result<Result<DateTime<Utc>>> {
    let s: String = row.get(idx)?;
    Ok(parse_ts(&s).ok_or_else(|| StoreError::Corrupt { table, id, reason: format!("bad timestamp '{}'", s) }))
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Result<Event>> {
    let id: i64 = row.get(0)?;
    let time_logged = ts_col(row, 1, "events", id)?;
    let time_event = ts_col(row, 2, "events", id)?;
    let time_last_update = ts_col(row, 3, "events", id)?;
    let type_code: i64 = row.get(4)?;
    let severity: i64 = row.get(5)?;
    let platform: String = row.get(6)?;
    let machine_serial: String = row.get(7)?;
    let machine_model: String = row.get(8)?;
    let nodename: String = row.get(9)?;
    let refcode: String = row.get(10)?;
    let description: String = row.get(11)?;
    let serviceable: bool = row.get(12)?;
    let predictive: bool = row.get(13)?;
    let closed: bool = row.get(14)?;
    let repair: i64 = row.get(15)?;
    Ok((|| -> Result<_> {
        let event_type = EventType::from_code(type_code).ok_or(StoreError::Corrupt { table: "events", id, reason: format!("unknown type {}", type_code) })?;
        Ok(Event {
            id: id as u64,
            time_logged: time_logged?,
            time_event: time_event?,
            time_last_update: time_last_update?,
            event_type,
            severity: severity.clamp(0, u8::MAX as i64) as u8,
            platform,
            machine_serial,
            machine_model,
            nodename,
            refcode,
            description,
            serviceable,
            predictive,
            closed,
            repair: repair.max(0) as u64,
            callouts: vec![],
        })
    })())
}

fn row_to_repair(row: &Row<'_>) -> rusqlite::Result<Result<RepairAction>> {
    let id: i64 = row.get(0)?;
    let time_logged = ts_col(row, 1, "repair_actions", id)?;
    let time_repair = ts_col(row, 2, "repair_actions", id)?;
    let procedure: String = row.get(3)?;
    let location: String = row.get(4)?;
    let platform: String = row.get(5)?;
    let machine_serial: String = row.get(6)?;
    let machine_model: String = row.get(7)?;
    let notes: String = row.get(8)?;
    Ok((|| -> Result<_> {
        Ok(RepairAction { id: id as u64, time_logged: time_logged?, time_repair: time_repair?, procedure, location, platform, machine_serial, machine_model, notes })
    })())
}

fn row_to_notify(row: &Row<'_>) -> rusqlite::Result<Result<Notify>> {
    let id: i64 = row.get(0)?;
    let time_logged = ts_col(row, 1, "notifications", id)?;
    let time_last_update = ts_col(row, 2, "notifications", id)?;
    let kind_code: i64 = row.get(3)?;
    let command: String = row.get(4)?;
    let method_code: i64 = row.get(5)?;
    let match_str: String = row.get(6)?;
    Ok((|| -> Result<_> {
        let kind = NotifyKind::from_code(kind_code).ok_or(StoreError::Corrupt { table: "notifications", id, reason: format!("unknown notify kind {}", kind_code) })?;
        let method = NotifyMethod::from_code(method_code).ok_or(StoreError::Corrupt { table: "notifications", id, reason: format!("unknown method {}", method_code) })?;
        Ok(Notify { id: id as u64, time_logged: time_logged?, time_last_update: time_last_update?, kind, method, command, match_str })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SEV_ERROR, SEV_INFO, SEV_WARNING};
    use chrono::TimeZone;

    fn event(t: EventType, sev: u8, serviceable: bool, location: &str) -> Event {
        let mut e = Event::new(t, sev, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        e.serviceable = serviceable;
        e.refcode = format!("#{}", sev);
        if !location.is_empty() { e.callouts.push(Callout { location: location.to_string(), procedure: "FSPSP04".to_string(), ..Default::default() }); }
        e
    }

    #[test]
    fn logs_and_queries_events() {
        let mut db = Servicelog::open_in_memory().unwrap();
        let a = db.event_log(&event(EventType::Os, SEV_ERROR, true, "U78A9.001-P1")).unwrap();
        let b = db.event_log(&event(EventType::Rtas, SEV_INFO, false, "")).unwrap();
        assert!(b > a);
        let all = db.event_query("").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].callouts.len(), 1);
        assert_eq!(all[0].callouts[0].location, "U78A9.001-P1");
        let errs = db.event_query("severity>=$ERROR").unwrap();
        assert_eq!(errs.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a]);
        let rtas = db.event_query("type=$RTAS").unwrap();
        assert_eq!(rtas.len(), 1);
        assert_eq!(rtas[0].event_type, EventType::Rtas);
    }

    #[test]
    fn time_columns_compare_as_dates() {
        let mut db = Servicelog::open_in_memory().unwrap();
        db.event_log(&event(EventType::Os, SEV_WARNING, false, "")).unwrap();
        assert_eq!(db.event_query("time_event>'2024-02-08'").unwrap().len(), 1);
        assert_eq!(db.event_query("time_event>'2024-03-02'").unwrap().len(), 0);
    }

    #[test]
    fn bad_query_is_reported() {
        let db = Servicelog::open_in_memory().unwrap();
        assert!(matches!(db.event_query("no_such_column=1"), Err(StoreError::Query { .. })));
        assert!(matches!(db.event_query("severity>=$LOUD"), Err(StoreError::UnknownConstant(_))));
    }

    #[test]
    fn constants_inside_quotes_are_untouched() {
        assert_eq!(expand_constants("severity>=$warning and refcode='$OS'").unwrap(), "severity>=4 and refcode='$OS'");
        assert_eq!(quote("it's"), "'it''s'");
    }

    #[test]
    fn repair_closes_matching_open_events() {
        let mut db = Servicelog::open_in_memory().unwrap();
        let hit = db.event_log(&event(EventType::Os, SEV_ERROR, true, "U1-P1")).unwrap();
        let other = db.event_log(&event(EventType::Os, SEV_ERROR, true, "U1-P2")).unwrap();
        let info = db.event_log(&event(EventType::Os, SEV_INFO, false, "U1-P1")).unwrap();
        let ra = RepairAction::new("U1-P1", "replace fan", Utc::now());
        let (rid, repaired) = db.repair_log(&ra).unwrap();
        assert_eq!(repaired.iter().map(|e| e.id).collect::<Vec<_>>(), vec![hit]);
        assert!(repaired[0].closed);
        assert_eq!(repaired[0].repair, rid);
        assert!(!db.event_get(other).unwrap().unwrap().closed);
        assert!(!db.event_get(info).unwrap().unwrap().closed);
        assert_eq!(db.repair_query("").unwrap().len(), 1);
        let (_, again) = db.repair_log(&ra).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn deletes_cascade_to_callouts() {
        let mut db = Servicelog::open_in_memory().unwrap();
        let id = db.event_log(&event(EventType::Os, SEV_ERROR, true, "U1-P1")).unwrap();
        db.event_delete(id).unwrap();
        assert!(db.event_query("").unwrap().is_empty());
        let n: i64 = db.conn.query_row("SELECT COUNT(*) FROM callouts", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn notify_round_trip() {
        let mut db = Servicelog::open_in_memory().unwrap();
        let n = Notify::new(NotifyKind::Events, NotifyMethod::PairsStdin, "/usr/bin/true", "severity>=5");
        let id = db.notify_log(&n).unwrap();
        let got = db.notify_get(id).unwrap().unwrap();
        assert_eq!(got.kind, NotifyKind::Events);
        assert_eq!(got.method, NotifyMethod::PairsStdin);
        assert_eq!(got.match_str, "severity>=5");
        assert_eq!(db.notify_query(&format!("command = {}", quote("/usr/bin/true"))).unwrap().len(), 1);
        db.notify_delete(id).unwrap();
        assert!(db.notify_get(id).unwrap().is_none());
    }

    #[test]
    fn file_database_persists() {
        let p = std::env::temp_dir().join(format!("servicelog_store_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&p);
        {
            let mut db = Servicelog::open(&p).unwrap();
            db.event_log(&event(EventType::Bmc, SEV_WARNING, false, "")).unwrap();
            db.close();
        }
        let db = Servicelog::open(&p).unwrap();
        assert_eq!(db.event_query("").unwrap().len(), 1);
        db.close();
        let _ = std::fs::remove_file(&p);
    }
}
