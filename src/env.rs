// SPDX-License-Identifier: MIT
//! Options sourced from environment variables (and an optional `.env` file).
//!
//! * `LOG_LEVEL` – `DEBUG`, `INFO`, `WARN` or `ERROR` (defaults to `INFO`).
//! * `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_RELEASE` – enable Sentry.
//! * `OTEL_EXPORTER_ENDPOINT` – enable tracing with this collector.
//! * `MYSQL_DSN` – enable the MySQL health check.
//! * `NATS_SERVERS` – enable NATS.
//!
//! Unset or empty variables leave their integration disabled. Console logging
//! is always enabled.
use tracing::Level;

use crate::options::{self, Opt};

/// Load `.env` if present, then build options from the process environment.
pub fn options_from_env() -> Vec<Opt> {
    if let Err(e) = dotenvy::dotenv() {
        // .env is optional, continue without it
        tracing::debug!(error = %e, "no .env file loaded");
    }
    options_from(|key| std::env::var(key).ok())
}

/// Build options from `lookup`, treating empty values as unset.
pub fn options_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<Opt> {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

    let level = var("LOG_LEVEL")
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(Level::INFO);
    let mut opts = vec![options::with_log([options::log_level(level)])];

    if let Some(dsn) = var("SENTRY_DSN") {
        let mut sentry = vec![options::sentry_dsn(dsn)];
        if let Some(env) = var("SENTRY_ENVIRONMENT") {
            sentry.push(options::sentry_environment(env));
        }
        if let Some(release) = var("SENTRY_RELEASE") {
            sentry.push(options::sentry_release(release));
        }
        opts.push(options::with_sentry(sentry));
    }
    if let Some(url) = var("OTEL_EXPORTER_ENDPOINT") {
        opts.push(options::with_trace([options::trace_exporter_url(url)]));
    }
    if let Some(dsn) = var("MYSQL_DSN") {
        opts.push(options::with_mysql([options::mysql_dsn(dsn)]));
    }
    if let Some(url) = var("NATS_SERVERS") {
        opts.push(options::with_nats([options::nats_url(url)]));
    }
    opts
}

// Only the four documented names, case-insensitively.
fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::options::Config;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::build("env-test", "test", options_from(|k| vars.get(k).cloned()))
    }

    #[test]
    fn empty_environment_only_enables_logging() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.log.map(|l| l.level), Some(Level::INFO));
        assert!(!cfg.is_sentry_enabled());
        assert!(!cfg.is_trace_enabled());
        assert!(!cfg.is_mysql_enabled());
        assert!(!cfg.is_nats_enabled());
    }

    fn level_for(value: &str) -> Option<Level> {
        config_from(&[("LOG_LEVEL", value)]).log.map(|l| l.level)
    }

    #[test]
    fn log_level_is_parsed() {
        assert_eq!(level_for("DEBUG"), Some(Level::DEBUG));
        assert_eq!(level_for("warn"), Some(Level::WARN));
        assert_eq!(level_for("Error"), Some(Level::ERROR));
        assert_eq!(level_for("loud"), Some(Level::INFO));
    }

    #[test]
    fn undocumented_levels_fall_back_to_info() {
        assert_eq!(level_for("TRACE"), Some(Level::INFO));
        assert_eq!(level_for("5"), Some(Level::INFO));
        assert_eq!(level_for("1"), Some(Level::INFO));
    }

    #[test]
    fn integrations_follow_variables() {
        let cfg = config_from(&[
            ("SENTRY_DSN", "https://key@o1.ingest.sentry.io/1"),
            ("SENTRY_RELEASE", "v3"),
            ("OTEL_EXPORTER_ENDPOINT", "collector:4318"),
            ("MYSQL_DSN", "user:pass@tcp(db:3306)/app"),
            ("NATS_SERVERS", "nats://bus:4222"),
        ]);
        let sentry = cfg.sentry.expect("sentry");
        assert_eq!(sentry.dsn, "https://key@o1.ingest.sentry.io/1");
        assert_eq!(sentry.release, "v3");
        assert!(sentry.environment.is_empty());
        assert_eq!(cfg.trace.expect("trace").exporter_url, "collector:4318");
        assert_eq!(cfg.mysql.expect("mysql").dsn, "user:pass@tcp(db:3306)/app");
        assert_eq!(cfg.nats.expect("nats").url, "nats://bus:4222");
    }

    #[test]
    fn empty_values_are_ignored() {
        let cfg = config_from(&[("SENTRY_DSN", ""), ("NATS_SERVERS", "")]);
        assert!(!cfg.is_sentry_enabled());
        assert!(!cfg.is_nats_enabled());
    }
}
