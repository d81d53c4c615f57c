use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SEV_DEBUG: u8 = 1;
pub const SEV_INFO: u8 = 2;
pub const SEV_EVENT: u8 = 3;
pub const SEV_WARNING: u8 = 4;
pub const SEV_ERROR_LOCAL: u8 = 5;
pub const SEV_ERROR: u8 = 6;
pub const SEV_FATAL: u8 = 7;

pub fn severity_name(sev: u8) -> &'static str {
    match sev { SEV_DEBUG => "DEBUG", SEV_INFO => "INFO", SEV_EVENT => "EVENT", SEV_WARNING => "WARNING", SEV_ERROR_LOCAL => "ERROR_LOCAL", SEV_ERROR => "ERROR", SEV_FATAL => "FATAL", _ => "UNKNOWN" }
}

/// Event types as stored in the database. The discriminant is the stored code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType { Basic = 0, Os = 1, Rtas = 2, Enclosure = 3, Bmc = 4 }

impl EventType {
    pub const ALL: [EventType; 5] = [EventType::Basic, EventType::Os, EventType::Rtas, EventType::Enclosure, EventType::Bmc];

    pub fn code(self) -> i64 { self as i64 }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self { EventType::Basic => "Basic", EventType::Os => "OS", EventType::Rtas => "RTAS", EventType::Enclosure => "Enclosure", EventType::Bmc => "BMC" }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callout {
    pub procedure: String,
    pub location: String,
    pub fru: String,
    pub serial: String,
    pub ccin: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub time_logged: DateTime<Utc>,
    pub time_event: DateTime<Utc>,
    pub time_last_update: DateTime<Utc>,
    pub event_type: EventType,
    pub severity: u8,
    pub platform: String,
    pub machine_serial: String,
    pub machine_model: String,
    pub nodename: String,
    pub refcode: String,
    pub description: String,
    pub serviceable: bool,
    pub predictive: bool,
    pub closed: bool,
    /// Id of the repair action that closed this event, 0 while open.
    pub repair: u64,
    pub callouts: Vec<Callout>,
}

impl Event {
    /// A fresh event; ids and log timestamps are assigned by the store.
    pub fn new(event_type: EventType, severity: u8, time_event: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            time_logged: time_event,
            time_event,
            time_last_update: time_event,
            event_type,
            severity,
            platform: String::new(),
            machine_serial: String::new(),
            machine_model: String::new(),
            nodename: String::new(),
            refcode: String::new(),
            description: String::new(),
            serviceable: false,
            predictive: false,
            closed: false,
            repair: 0,
            callouts: vec![],
        }
    }

    pub fn is_open(&self) -> bool { self.serviceable && !self.closed }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepairAction {
    pub id: u64,
    pub time_logged: DateTime<Utc>,
    pub time_repair: DateTime<Utc>,
    pub procedure: String,
    pub location: String,
    pub platform: String,
    pub machine_serial: String,
    pub machine_model: String,
    pub notes: String,
}

impl RepairAction {
    pub fn new(location: &str, procedure: &str, time_repair: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            time_logged: time_repair,
            time_repair,
            procedure: procedure.to_string(),
            location: location.to_string(),
            platform: String::new(),
            machine_serial: String::new(),
            machine_model: String::new(),
            notes: String::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind { Events = 0, Repairs = 1 }

impl NotifyKind {
    pub fn code(self) -> i64 { self as i64 }
    pub fn from_code(code: i64) -> Option<Self> {
        match code { 0 => Some(NotifyKind::Events), 1 => Some(NotifyKind::Repairs), _ => None }
    }
    pub fn label(self) -> &'static str {
        match self { NotifyKind::Events => "Events", NotifyKind::Repairs => "Repair Actions" }
    }
}

/// How a registered tool receives the record it is notified about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum NotifyMethod {
    #[default]
    NumStdin = 0,
    NumArg = 1,
    TextStdin = 2,
    PairsStdin = 3,
}

impl NotifyMethod {
    pub fn code(self) -> i64 { self as i64 }
    pub fn from_code(code: i64) -> Option<Self> {
        match code { 0 => Some(NotifyMethod::NumStdin), 1 => Some(NotifyMethod::NumArg), 2 => Some(NotifyMethod::TextStdin), 3 => Some(NotifyMethod::PairsStdin), _ => None }
    }
    pub fn describe(self) -> &'static str {
        match self {
            NotifyMethod::NumStdin => "Send ID via stdin",
            NotifyMethod::NumArg => "Send ID via command line",
            NotifyMethod::TextStdin => "Send text via stdin",
            NotifyMethod::PairsStdin => "Send name/value pairs via stdin",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    pub id: u64,
    pub time_logged: DateTime<Utc>,
    pub time_last_update: DateTime<Utc>,
    pub kind: NotifyKind,
    pub method: NotifyMethod,
    pub command: String,
    #[serde(rename = "match")]
    pub match_str: String,
}

impl Notify {
    pub fn new(kind: NotifyKind, method: NotifyMethod, command: &str, match_str: &str) -> Self {
        let now = Utc::now();
        Self { id: 0, time_logged: now, time_last_update: now, kind, method, command: command.to_string(), match_str: match_str.to_string() }
    }
}
