//! Worker settings read from the environment.

use std::time::Duration;

use actors::WorkerSettings;
use db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}={value}: expected milliseconds")]
    InvalidMillis { name: &'static str, value: String },

    #[error(
        "DB_ENDPOINT={0} is embedded in this process and cannot be shared with the \
         service that enqueues jobs; point it at a ws:// or http:// server or set \
         WORKER_ALLOW_EMBEDDED_DB=true"
    )]
    EmbeddedDatabase(String),
}

fn millis(name: &'static str, value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse().map(Duration::from_millis).map_err(|_| ConfigError::InvalidMillis {
            name,
            value: v.to_string(),
        }),
    }
}

/// Read `WORKER_POLL_TIMEOUT_MS` and `WORKER_IDLE_SLEEP_MS`.
pub fn worker_settings() -> Result<WorkerSettings, ConfigError> {
    settings_from(|name| std::env::var(name).ok())
}

/// Refuse an embedded database unless `WORKER_ALLOW_EMBEDDED_DB` is set.
pub fn ensure_shared_database(config: &DbConfig) -> Result<(), ConfigError> {
    check_database(config, |name| std::env::var(name).ok())
}

fn check_database(
    config: &DbConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let allowed = var("WORKER_ALLOW_EMBEDDED_DB")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if config.is_embedded() && !allowed {
        return Err(ConfigError::EmbeddedDatabase(config.endpoint.clone()));
    }
    Ok(())
}

fn settings_from(var: impl Fn(&str) -> Option<String>) -> Result<WorkerSettings, ConfigError> {
    let defaults = WorkerSettings::default();
    Ok(WorkerSettings {
        poll_timeout: millis(
            "WORKER_POLL_TIMEOUT_MS",
            var("WORKER_POLL_TIMEOUT_MS"),
            defaults.poll_timeout,
        )?,
        idle_sleep: millis(
            "WORKER_IDLE_SLEEP_MS",
            var("WORKER_IDLE_SLEEP_MS"),
            defaults.idle_sleep,
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_values_keep_defaults() {
        let settings = settings_from(|_| None).unwrap();
        assert_eq!(settings, WorkerSettings::default());

        let blank = settings_from(|_| Some("  ".to_string())).unwrap();
        assert_eq!(blank, WorkerSettings::default());
    }

    #[test]
    fn parses_milliseconds() {
        let settings = settings_from(|name| match name {
            "WORKER_POLL_TIMEOUT_MS" => Some("2500".to_string()),
            _ => Some("75".to_string()),
        })
        .unwrap();
        assert_eq!(settings.poll_timeout, Duration::from_millis(2500));
        assert_eq!(settings.idle_sleep, Duration::from_millis(75));
    }

    #[test]
    fn rejects_garbage() {
        let err = settings_from(|_| Some("soon".to_string())).unwrap_err();
        assert!(err.to_string().contains("WORKER_POLL_TIMEOUT_MS"));
    }

    #[test]
    fn embedded_database_is_refused() {
        let err = check_database(&DbConfig::memory(), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::EmbeddedDatabase(ref e) if e == "mem://"));

        let rocks = DbConfig::rocksdb("/var/lib/tickets");
        assert!(check_database(&rocks, |_| Some("false".to_string())).is_err());
    }

    #[test]
    fn embedded_database_allowed_in_process() {
        let allow = |name: &str| (name == "WORKER_ALLOW_EMBEDDED_DB").then(|| "true".to_string());
        assert!(check_database(&DbConfig::memory(), allow).is_ok());
    }

    #[test]
    fn server_endpoints_pass() {
        for endpoint in ["ws://db:8000", "wss://db.example.com", "http://127.0.0.1:8000"] {
            let config = DbConfig {
                endpoint: endpoint.to_string(),
                ..DbConfig::default()
            };
            assert!(check_database(&config, |_| None).is_ok(), "{endpoint}");
        }
    }
}
