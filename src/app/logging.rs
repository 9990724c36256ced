use tracing_subscriber::{filter::ParseError, EnvFilter};

use covid_counties::config::LoggingConfig;

/// Logs go to an hourly rolling file; stdout is reserved for data.
pub fn setup_logger(config: &LoggingConfig, debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file_appender = tracing_appender::rolling::hourly(&config.directory, &config.file_name);
    let subscriber = tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter(config, debug)?)
        .with_writer(file_appender)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// `--debug` wins over `RUST_LOG`, which wins over the configured level.
fn env_filter(config: &LoggingConfig, debug: bool) -> Result<EnvFilter, ParseError> {
    if debug {
        return EnvFilter::try_new("debug");
    }
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))
}
