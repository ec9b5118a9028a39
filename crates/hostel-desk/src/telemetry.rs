use crate::config::TelemetryConfig;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level '{value}': unable to build a filter from it")]
    Filter { value: String, source: ParseError },
    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Filter applied when `RUST_LOG` is unset: the configured level for the
/// engine crates, `warn` for everything else.
fn engine_filter(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(format!("warn,hostel_desk={level},hostel_desk_api={level}"))
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => engine_filter(&config.log_level).map_err(|source| TelemetryError::Filter {
            value: config.log_level.clone(),
            source,
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
