use thiserror::Error;

use crate::date::DateError;
use crate::store::StoreError;

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_DB: i32 = 2;
pub const EXIT_LOG: i32 = 3;
pub const EXIT_CANCELLED: i32 = 4;

/// Failures surfaced by the command-line tools, each tied to an exit status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Date(#[from] DateError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadCommand(String),
    #[error("{0}")]
    Config(#[source] anyhow::Error),
    #[error("{context}\n{source}")]
    Open { context: String, #[source] source: StoreError },
    #[error(transparent)]
    Query(#[from] StoreError),
    #[error("{0}")]
    Lookup(String),
    #[error("{0}")]
    Denied(String),
    #[error("no reply received; nothing was changed")]
    NoReply,
    #[error("{0}")]
    Launch(String),
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{context}\n{source}")]
    Log { context: String, #[source] source: StoreError },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Date(_) | CliError::NotFound(_) | CliError::BadCommand(_) | CliError::Config(_) => EXIT_USAGE,
            CliError::Open { .. } | CliError::Query(_) | CliError::Lookup(_) | CliError::Denied(_) | CliError::NoReply | CliError::Launch(_) | CliError::Io(_) => EXIT_DB,
            CliError::Log { .. } => EXIT_LOG,
        }
    }

    pub fn usage(msg: impl Into<String>) -> Self { CliError::Usage(msg.into()) }

    pub fn log(context: impl Into<String>, source: StoreError) -> Self { CliError::Log { context: context.into(), source } }
}
