pub mod cli;
pub mod commands;
pub mod config;
pub mod date;
pub mod dispatch;
pub mod error;
pub mod legacy_filter;
pub mod logging;
pub mod model;
pub mod print;
pub mod prompt;
pub mod store;
