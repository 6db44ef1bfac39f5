// SPDX-License-Identifier: MIT
//! Settings bundle and the option functions that build it.
//!
//! Every integration is configured by an `with_*` option which enables it and
//! folds a list of field setters over that integration's default settings:
//!
//! ```
//! use service_tooling::options::{self, Config};
//!
//! let cfg = Config::build(
//!     "orders",
//!     "production",
//!     [
//!         options::with_sentry([
//!             options::sentry_dsn("https://key@o1.ingest.sentry.io/1"),
//!             options::sentry_release("v1.2.0"),
//!         ]),
//!         options::with_nats([options::nats_url("nats://localhost:4222")]),
//!     ],
//! );
//! assert!(cfg.is_sentry_enabled());
//! assert!(!cfg.is_trace_enabled());
//! ```
//!
//! Options never validate; missing required fields are reported by
//! [`crate::telemetry::init`].
use std::fmt;

use tracing::Level;

use crate::k8s;

/// A deferred mutation of a settings value of type `T`.
///
/// Top-level options are `Setter<Config>`; each integration has its own
/// sub-option alias over its settings struct.
pub struct Setter<T>(Box<dyn FnOnce(&mut T) + Send>);

impl<T> Setter<T> {
    pub fn new(f: impl FnOnce(&mut T) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn apply(self, target: &mut T) {
        (self.0)(target)
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Setter(..)")
    }
}

pub type Opt = Setter<Config>;
pub type LogOpt = Setter<LogSettings>;
pub type SentryOpt = Setter<SentrySettings>;
pub type TraceOpt = Setter<TraceSettings>;
pub type MysqlOpt = Setter<MysqlSettings>;
pub type NatsOpt = Setter<NatsSettings>;

/// Settings for every integration. `None` means the integration is disabled.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub service_name: String,
    pub environment: String,
    pub log: Option<LogSettings>,
    pub sentry: Option<SentrySettings>,
    pub trace: Option<TraceSettings>,
    pub mysql: Option<MysqlSettings>,
    pub nats: Option<NatsSettings>,
}

impl Config {
    /// Fold `opts` over an empty config. Later options win over earlier ones.
    ///
    /// An empty `environment` is replaced by [`k8s::detect_environment`].
    pub fn build<I>(
        service_name: impl Into<String>,
        environment: impl Into<String>,
        opts: I,
    ) -> Self
    where
        I: IntoIterator<Item = Opt>,
    {
        let mut environment = environment.into();
        if environment.is_empty() {
            environment = k8s::detect_environment().to_string();
        }
        let mut cfg = Config {
            service_name: service_name.into(),
            environment,
            ..Config::default()
        };
        for opt in opts {
            opt.apply(&mut cfg);
        }
        cfg
    }

    pub fn is_log_enabled(&self) -> bool {
        self.log.is_some()
    }

    pub fn is_sentry_enabled(&self) -> bool {
        self.sentry.is_some()
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.trace.is_some()
    }

    pub fn is_mysql_enabled(&self) -> bool {
        self.mysql.is_some()
    }

    pub fn is_nats_enabled(&self) -> bool {
        self.nats.is_some()
    }
}

fn fold<T: Default>(opts: impl IntoIterator<Item = Setter<T>>) -> T {
    let mut settings = T::default();
    for opt in opts {
        opt.apply(&mut settings);
    }
    settings
}

// --- log façade ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

/// Enable console logging.
pub fn with_log(opts: impl IntoIterator<Item = LogOpt>) -> Opt {
    let settings = fold(opts);
    Opt::new(move |cfg| cfg.log = Some(settings))
}

pub fn log_level(level: Level) -> LogOpt {
    LogOpt::new(move |s| s.level = level)
}

// --- Sentry ---

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SentrySettings {
    pub dsn: String,
    /// Falls back to [`Config::environment`] when empty.
    pub environment: String,
    pub release: String,
}

/// Enable Sentry error reporting.
pub fn with_sentry(opts: impl IntoIterator<Item = SentryOpt>) -> Opt {
    let settings = fold(opts);
    Opt::new(move |cfg| cfg.sentry = Some(settings))
}

pub fn sentry_dsn(dsn: impl Into<String>) -> SentryOpt {
    let dsn = dsn.into();
    SentryOpt::new(move |s| s.dsn = dsn)
}

pub fn sentry_environment(env: impl Into<String>) -> SentryOpt {
    let env = env.into();
    SentryOpt::new(move |s| s.environment = env)
}

pub fn sentry_release(release: impl Into<String>) -> SentryOpt {
    let release = release.into();
    SentryOpt::new(move |s| s.release = release)
}

// --- distributed tracing ---

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceSettings {
    /// OTLP collector, either `host:port` or a full `http(s)://` base URL.
    pub exporter_url: String,
}

/// Enable OpenTelemetry tracing.
pub fn with_trace(opts: impl IntoIterator<Item = TraceOpt>) -> Opt {
    let settings = fold(opts);
    Opt::new(move |cfg| cfg.trace = Some(settings))
}

pub fn trace_exporter_url(url: impl Into<String>) -> TraceOpt {
    let url = url.into();
    TraceOpt::new(move |s| s.exporter_url = url)
}

// --- MySQL ---

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MysqlSettings {
    pub dsn: String,
}

/// Enable the MySQL health check.
pub fn with_mysql(opts: impl IntoIterator<Item = MysqlOpt>) -> Opt {
    let settings = fold(opts);
    Opt::new(move |cfg| cfg.mysql = Some(settings))
}

pub fn mysql_dsn(dsn: impl Into<String>) -> MysqlOpt {
    let dsn = dsn.into();
    MysqlOpt::new(move |s| s.dsn = dsn)
}

// --- NATS ---

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NatsSettings {
    pub url: String,
}

/// Enable NATS messaging and the heartbeat.
pub fn with_nats(opts: impl IntoIterator<Item = NatsOpt>) -> Opt {
    let settings = fold(opts);
    Opt::new(move |cfg| cfg.nats = Some(settings))
}

pub fn nats_url(url: impl Into<String>) -> NatsOpt {
    let url = url.into();
    NatsOpt::new(move |s| s.url = url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(opt: Opt) -> Config {
        let mut cfg = Config::default();
        opt.apply(&mut cfg);
        cfg
    }

    #[test]
    fn empty_config_has_everything_disabled() {
        let cfg = Config::build("svc", "test", []);
        assert_eq!(cfg.service_name, "svc");
        assert_eq!(cfg.environment, "test");
        assert!(!cfg.is_log_enabled());
        assert!(!cfg.is_sentry_enabled());
        assert!(!cfg.is_trace_enabled());
        assert!(!cfg.is_mysql_enabled());
        assert!(!cfg.is_nats_enabled());
    }

    #[test]
    fn with_log_sets_level() {
        let cfg = apply(with_log([log_level(Level::WARN)]));
        assert_eq!(cfg.log, Some(LogSettings { level: Level::WARN }));
    }

    #[test]
    fn with_log_defaults_to_info() {
        let cfg = apply(with_log([]));
        assert_eq!(cfg.log.map(|l| l.level), Some(Level::INFO));
    }

    #[test]
    fn with_sentry_sets_fields() {
        let cfg = apply(with_sentry([
            sentry_dsn("test-dsn"),
            sentry_environment("test-env"),
            sentry_release("test-release"),
        ]));
        let sentry = cfg.sentry.expect("sentry enabled");
        assert_eq!(sentry.dsn, "test-dsn");
        assert_eq!(sentry.environment, "test-env");
        assert_eq!(sentry.release, "test-release");
    }

    #[test]
    fn unset_fields_keep_zero_value() {
        let cfg = apply(with_sentry([sentry_release("v1")]));
        let sentry = cfg.sentry.expect("sentry enabled");
        assert!(sentry.dsn.is_empty());
        assert!(sentry.environment.is_empty());
        assert_eq!(sentry.release, "v1");
    }

    #[test]
    fn with_trace_mysql_nats_set_fields() {
        let cfg = Config::build(
            "svc",
            "test",
            [
                with_trace([trace_exporter_url("test-url")]),
                with_mysql([mysql_dsn("test-mysql-dsn")]),
                with_nats([nats_url("test-nats-url")]),
            ],
        );
        assert_eq!(cfg.trace.expect("trace").exporter_url, "test-url");
        assert_eq!(cfg.mysql.expect("mysql").dsn, "test-mysql-dsn");
        assert_eq!(cfg.nats.expect("nats").url, "test-nats-url");
    }

    #[test]
    fn last_sub_option_wins() {
        let cfg = apply(with_nats([nats_url("nats://a:4222"), nats_url("nats://b:4222")]));
        assert_eq!(cfg.nats.expect("nats").url, "nats://b:4222");
    }

    #[test]
    fn later_integration_option_replaces_earlier_settings() {
        let cfg = Config::build(
            "svc",
            "test",
            [
                with_sentry([sentry_dsn("first"), sentry_release("v1")]),
                with_sentry([sentry_dsn("second")]),
            ],
        );
        let sentry = cfg.sentry.expect("sentry enabled");
        assert_eq!(sentry.dsn, "second");
        assert!(sentry.release.is_empty());
    }

    #[test]
    fn empty_environment_is_detected() {
        let cfg = Config::build("svc", "", []);
        assert!(!cfg.environment.is_empty());
    }
}
