//! Log output for the flight link: an optional console sink and an optional
//! rolling file sink, both filtered by `RUST_LOG` or the configured level.

use crate::domain::settings::LogSettings;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Dropping this flushes and stops the background file writer
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

fn parse_rotation(rotation: &str) -> Rotation {
    match rotation.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn level_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer<S>(settings: &LogSettings) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(settings.ansi_colors)
            .with_target(settings.show_target)
            .with_thread_ids(settings.show_thread_ids)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
    })
}

fn file_layer<S>(settings: &LogSettings, guards: &mut Vec<WorkerGuard>) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !settings.file_logging_enabled {
        return None;
    }
    let appender = RollingFileAppender::new(
        parse_rotation(&settings.rotation),
        &settings.log_dir,
        &settings.file_name_prefix,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);

    Some(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(settings.show_target)
            .with_thread_ids(settings.show_thread_ids)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line),
    )
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();
    let file = file_layer(settings, &mut guards);

    tracing_subscriber::registry()
        .with(level_filter(settings))
        .with(console_layer(settings))
        .with(file)
        .try_init()?;

    tracing::info!(
        "Logging to {}{}",
        if settings.console_logging_enabled { "console" } else { "no console" },
        if settings.file_logging_enabled { " and file" } else { "" }
    );

    Ok(LoggingGuard { _guards: guards })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_parsing() {
        assert_eq!(parse_rotation("Hourly"), Rotation::HOURLY);
        assert_eq!(parse_rotation("never"), Rotation::NEVER);
        assert_eq!(parse_rotation("weekly"), Rotation::DAILY);
    }

    #[test]
    fn test_bad_level_falls_back() {
        let settings = LogSettings {
            level: "not a [level".to_string(),
            ..LogSettings::default()
        };
        // Must not panic regardless of RUST_LOG
        let _ = level_filter(&settings);
    }

    #[test]
    fn test_disabled_sinks_build_no_layers() {
        let settings = LogSettings {
            console_logging_enabled: false,
            file_logging_enabled: false,
            ..LogSettings::default()
        };
        let mut guards = Vec::new();
        assert!(console_layer::<tracing_subscriber::Registry>(&settings).is_none());
        assert!(file_layer::<tracing_subscriber::Registry>(&settings, &mut guards).is_none());
        assert!(guards.is_empty());
    }
}
