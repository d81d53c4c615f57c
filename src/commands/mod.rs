use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::date::TimeZone;
use crate::error::CliError;
use crate::store::Servicelog;

pub mod common_event;
pub mod legacy_query;
pub mod manage;
pub mod notify;
pub mod query;
pub mod repair;

/// Everything a tool needs from its surroundings for one invocation.
pub struct Context<'a> {
    pub db_path: PathBuf,
    pub tz: TimeZone,
    pub out: &'a mut dyn Write,
    pub input: &'a mut dyn BufRead,
}

pub(crate) fn open_db(ctx: &Context<'_>) -> Result<Servicelog, CliError> {
    Servicelog::open(&ctx.db_path).map_err(|source| CliError::Open { context: "Could not open servicelog database.".to_string(), source })
}
