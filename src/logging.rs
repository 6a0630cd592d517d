use std::fmt::Display;
use std::fs;
use std::path::Path;

use colored::Colorize;
use log::{Level, LevelFilter};

/// Dependencies only get to report problems
const ALLOWED_EXTERNAL_LEVELS: [Level; 2] = [Level::Warn, Level::Error];

/// Maps `-v` occurrences to a level for this crate
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logs to `log_file` when given, otherwise to stderr.
///
/// The typing screen owns the terminal, so interactive runs pass a file.
pub fn init_logger(verbosity: u8, log_file: Option<&Path>) -> Result<(), fern::InitError> {
    let level = level_for(verbosity);
    let to_file = log_file.is_some();

    let dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            if to_file {
                out.finish(format_args!(
                    "{} {:<5} {} {}",
                    now.format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    target.plain(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{:^5} {} {:^8} {}",
                    level_badge(&record.level()),
                    now.format("%H:%M:%S").to_string().bright_black(),
                    target,
                    message
                ))
            }
        })
        .filter(move |meta| {
            let target = Target::from_str(meta.target());

            if target.is_local() {
                meta.level() <= level
            } else {
                ALLOWED_EXTERNAL_LEVELS.contains(&meta.level())
            }
        });

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            dispatch.chain(fern::log_file(path)?).apply()?;
        }
        None => dispatch.chain(std::io::stderr()).apply()?,
    }

    Ok(())
}

enum Target {
    External(String),
    Local(String),
}

impl Target {
    fn from_str(str: &str) -> Self {
        let mut split = str.split("::");
        let krate = split.next().unwrap_or_default();
        let module = split.next().unwrap_or(krate);

        match krate {
            "showspeed" => Self::Local(module.to_uppercase()),
            other => Self::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    fn plain(&self) -> &str {
        match self {
            Target::External(x) | Target::Local(x) => x,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Local(x) => x.as_str().bright_green(),
        };

        Display::fmt(&result, f)
    }
}

fn level_badge(level: &Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}
