use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat { Text, Json }

#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
    pub path: Option<String>,
    pub quiet: bool,
    pub verbose: u8,
}

/// Quiet first, then an explicit level, then `-v` counts. `None` leaves
/// `RUST_LOG` in charge.
pub fn level_filter(opts: &LogOptions) -> Option<log::LevelFilter> {
    if opts.quiet { return Some(log::LevelFilter::Error); }
    if let Some(lvl) = opts.level {
        return Some(match lvl {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        });
    }
    match opts.verbose {
        0 => None,
        1 => Some(log::LevelFilter::Info),
        2 => Some(log::LevelFilter::Debug),
        _ => Some(log::LevelFilter::Trace),
    }
}

pub fn init(opts: &LogOptions) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(f) = level_filter(opts) { builder.filter_level(f); }
    match opts.format.unwrap_or(LogFormat::Text) {
        LogFormat::Json => {
            builder.format(|buf, record| {
                use std::io::Write;
                let ts = chrono::Local::now().to_rfc3339();
                let obj = serde_json::json!({
                    "ts": ts,
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        LogFormat::Text => {
            builder.format(|buf, record| {
                use std::io::Write;
                let ts = chrono::Local::now().format("%H:%M:%S");
                writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
            });
        }
    }
    if let Some(path) = opts.path.as_ref() {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
            }
        }
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_everything() {
        let o = LogOptions { quiet: true, level: Some(LogLevel::Trace), verbose: 3, ..Default::default() };
        assert_eq!(level_filter(&o), Some(log::LevelFilter::Error));
    }

    #[test]
    fn explicit_level_beats_verbosity() {
        let o = LogOptions { level: Some(LogLevel::Warn), verbose: 2, ..Default::default() };
        assert_eq!(level_filter(&o), Some(log::LevelFilter::Warn));
    }

    #[test]
    fn verbosity_steps() {
        let lv = |v| level_filter(&LogOptions { verbose: v, ..Default::default() });
        assert_eq!(lv(0), None);
        assert_eq!(lv(1), Some(log::LevelFilter::Info));
        assert_eq!(lv(2), Some(log::LevelFilter::Debug));
        assert_eq!(lv(5), Some(log::LevelFilter::Trace));
    }
}
