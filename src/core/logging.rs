use console::Style;
use log::{Level, LevelFilter};

use crate::types::config::{colors_enabled, config};

fn level_style(level: Level) -> Style {
    match level {
        Level::Error => Style::new().red().bold(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug => Style::new().blue(),
        Level::Trace => Style::new().dim(),
    }
}

pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Route `log` records to stderr. Must run after configuration is initialized.
pub fn init_logging() {
    let level = parse_level(config().log().level());
    let colors = colors_enabled();
    let verbose = level >= LevelFilter::Debug;

    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            let label = if colors {
                level_style(record.level())
                    .apply_to(format!("{:<5}", record.level()))
                    .to_string()
            } else {
                format!("{:<5}", record.level())
            };
            if verbose {
                out.finish(format_args!(
                    "{} {} [{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    label,
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!("{label} {message}"))
            }
        })
        .level(level)
        // HTTP client internals are noise at debug level
        .level_for("ureq", LevelFilter::Warn)
        .level_for("rustls", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply();

    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}
