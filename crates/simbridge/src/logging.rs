use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives, e.g.
/// `simbridge_server=trace,simbridge_provider=debug`.
pub const LOG_ENV: &str = "SIMBRIDGE_LOG";

/// Crates whose events reach stderr. Everything else stays silent.
const LOG_TARGETS: [&str; 5] = [
    "simbridge",
    "simbridge_transport",
    "simbridge_frame",
    "simbridge_server",
    "simbridge_provider",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `target=level` for each workspace crate.
fn default_directives(level: LogLevel) -> String {
    let level = LevelFilter::from(level);
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Filter from `SIMBRIDGE_LOG` when set and valid, else from `level`.
fn build_filter(level: LogLevel, env_directives: Option<&str>) -> EnvFilter {
    env_directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(level)))
}

/// Install the stderr subscriber. Span fields (port, host, segment name)
/// are part of every event line.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env_directives = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, env_directives.as_deref()))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().with_current_span(true).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_to_every_workspace_crate() {
        let directives = default_directives(LogLevel::Debug);
        for target in LOG_TARGETS {
            assert!(directives.contains(&format!("{target}=debug")), "{directives}");
        }
    }

    #[test]
    fn env_directives_take_precedence() {
        let filter = build_filter(LogLevel::Error, Some("simbridge_server=trace"));
        assert_eq!(filter.to_string(), "simbridge_server=trace");
    }

    #[test]
    fn invalid_or_blank_env_falls_back_to_level() {
        let expected = default_directives(LogLevel::Warn);
        for env in [None, Some(""), Some("simbridge_server=loud")] {
            let filter = build_filter(LogLevel::Warn, env);
            let rendered = filter.to_string();
            for directive in expected.split(',') {
                assert!(rendered.contains(directive), "{rendered}");
            }
        }
    }
}
