use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::EventType;

/// Longest match string the translator will produce.
pub const MAX_FILTER_LEN: usize = 1023;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum TriState {
    Yes,
    No,
    #[default]
    All,
}

impl TriState {
    fn as_flag(self) -> Option<u8> {
        match self { TriState::Yes => Some(1), TriState::No => Some(0), TriState::All => None }
    }
}

/// Event type names accepted by the legacy `--type` flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyType { Os, App, Ppc64Rtas, Ppc64Encl }

impl LegacyType {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "os" => Some(LegacyType::Os),
            "app" => Some(LegacyType::App),
            "ppc64_rtas" => Some(LegacyType::Ppc64Rtas),
            "ppc64_encl" => Some(LegacyType::Ppc64Encl),
            _ => None,
        }
    }

    /// Application events have no counterpart in the current schema.
    pub fn current_type(self) -> Option<EventType> {
        match self {
            LegacyType::Os => Some(EventType::Os),
            LegacyType::Ppc64Rtas => Some(EventType::Rtas),
            LegacyType::Ppc64Encl => Some(EventType::Enclosure),
            LegacyType::App => None,
        }
    }
}

/// Bitmap of event types, one bit per [`EventType`] code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeSet(u64);

impl TypeSet {
    pub fn insert(&mut self, t: EventType) { self.0 |= 1 << t.code(); }
    pub fn contains(&self, t: EventType) -> bool { self.0 & (1 << t.code()) != 0 }
    pub fn is_empty(&self) -> bool { self.0 == 0 }
    pub fn clear(&mut self) { self.0 = 0; }

    /// Members in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        EventType::ALL.into_iter().filter(|t| self.contains(*t))
    }
}

/// Collects repeated `--type` values for one invocation.
///
/// Each value may hold several tokens separated by `|` or `,`. `all` resets
/// whatever was collected before it. `EVENT` and `REPAIR` select notification
/// kinds for `servicelog_notify`. Anything else is ignored.
#[derive(Clone, Debug, Default)]
pub struct TypeAccumulator {
    types: TypeSet,
    events: bool,
    repairs: bool,
    // A type token was seen since the last `all`.
    typed: bool,
    ignored: Vec<String>,
}

impl TypeAccumulator {
    pub fn new() -> Self { Self::default() }

    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        let mut acc = Self::new();
        for v in values { acc.add(v.as_ref()); }
        acc
    }

    pub fn add(&mut self, value: &str) {
        for token in value.split(['|', ',']).map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "all" => {
                    self.types.clear();
                    self.typed = false;
                }
                "EVENT" => self.events = true,
                "REPAIR" => self.repairs = true,
                _ => match LegacyType::from_token(token) {
                    Some(lt) => {
                        self.typed = true;
                        if let Some(t) = lt.current_type() { self.types.insert(t); }
                    }
                    None => self.ignored.push(token.to_string()),
                },
            }
        }
    }

    pub fn types(&self) -> TypeSet { self.types }
    pub fn wants_events(&self) -> bool { self.events }
    pub fn wants_repairs(&self) -> bool { self.repairs }
    pub fn ignored(&self) -> &[String] { &self.ignored }

    /// Types were asked for, but none of them exist in the current schema
    /// (`--type app`). Such a selection matches no event.
    pub fn selects_nothing(&self) -> bool { self.typed && self.types.is_empty() }

    pub fn log_ignored(&self) {
        if !self.ignored.is_empty() { log::debug!("ignoring unrecognized event types: {}", self.ignored.join(", ")); }
    }
}

/// Legacy selectors gathered from the command line.
///
/// Severity is range-checked by the flag parser; the translator trusts it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LegacyFilter {
    pub types: TypeSet,
    pub severity: Option<u8>,
    pub serviceable: TriState,
    pub repaired: TriState,
}

impl LegacyFilter {
    pub fn to_match(&self) -> String { self.to_match_bounded(MAX_FILTER_LEN) }

    pub fn to_match_bounded(&self, cap: usize) -> String {
        let mut buf = FilterBuf::new(cap);
        if !self.types.is_empty() {
            let codes: Vec<String> = self.types.iter().map(|t| t.code().to_string()).collect();
            buf.push_clause(&format!("type IN ({})", codes.join(",")));
        }
        if let Some(sev) = self.severity { buf.push_clause(&format!("severity>={}", sev)); }
        if let Some(v) = self.serviceable.as_flag() { buf.push_clause(&format!("serviceable={}", v)); }
        if let Some(v) = self.repaired.as_flag() { buf.push_clause(&format!("closed={}", v)); }
        buf.finish()
    }
}

/// An explicit match string wins outright; the legacy filter is discarded.
pub fn resolve_match(explicit: Option<&str>, legacy: &LegacyFilter) -> String {
    match explicit {
        Some(m) => m.to_string(),
        None => legacy.to_match(),
    }
}

struct FilterBuf { out: String, cap: usize }

impl FilterBuf {
    fn new(cap: usize) -> Self { Self { out: String::new(), cap } }

    fn push_clause(&mut self, clause: &str) {
        let sep = if self.out.is_empty() { "" } else { " and " };
        if self.out.len() + sep.len() + clause.len() > self.cap {
            log::warn!("match string limit of {} bytes reached; dropping clause '{}'", self.cap, clause);
            return;
        }
        self.out.push_str(sep);
        self.out.push_str(clause);
    }

    fn finish(self) -> String { self.out }
}
