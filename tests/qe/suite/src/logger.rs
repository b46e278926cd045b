use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing::Level;

/// Log level used when `--debug` is not given.
pub const LOG_LEVEL_ENV: &str = "CEPHQE_LOG_LEVEL";

#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "info";

fn detect_log_level(debug: bool, from_env: Option<String>) -> Result<Level> {
    let level = match from_env {
        _ if debug => "debug".to_owned(),
        Some(level) => level,
        None => DEFAULT_LOG_LEVEL.to_owned(),
    };
    Level::from_str(&level).with_context(|| format!("invalid log level {level}"))
}

/// Logs go to stderr so that the test report on stdout stays readable.
pub fn init(debug: bool) -> Result<()> {
    let level = detect_log_level(debug, std::env::var(LOG_LEVEL_ENV).ok())?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to init logger: {}", e))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_detect_log_level() {
        assert_eq!(detect_log_level(true, Some("error".into())).unwrap(), Level::DEBUG);
        assert_eq!(detect_log_level(false, Some("warn".into())).unwrap(), Level::WARN);
        assert!(detect_log_level(false, Some("loud".into())).is_err());
    }

    #[test]
    #[serial]
    fn test_log_level_from_env() {
        std::env::set_var(LOG_LEVEL_ENV, "trace");
        let level = detect_log_level(false, std::env::var(LOG_LEVEL_ENV).ok());
        std::env::remove_var(LOG_LEVEL_ENV);
        assert_eq!(level.unwrap(), Level::TRACE);
        assert_eq!(
            detect_log_level(false, std::env::var(LOG_LEVEL_ENV).ok()).unwrap(),
            Level::from_str(DEFAULT_LOG_LEVEL).unwrap()
        );
    }
}
