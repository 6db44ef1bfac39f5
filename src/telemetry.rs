// SPDX-License-Identifier: MIT
//! Telemetry initialization: NATS, console logs, Sentry and OpenTelemetry traces.
//!
//! The public API is intentionally minimal:
//!
//! * [`init`] – applies options and brings up every enabled integration.
//! * [`Telemetry`] – handle to the running integrations, the health state and shutdown.
//!
//! Integrations start in a fixed order and the first failure aborts:
//!
//! 1. NATS – connect, then spawn the heartbeat ([`crate::healthz::spawn_heartbeat`]).
//! 2. Log façade – global `tracing` subscriber (installed once per process, and only
//!    when logging or tracing is enabled).
//! 3. Sentry – client bound to the global hub.
//! 4. Tracing – OTLP span exporter, global tracer provider and propagator.
//! 5. MySQL – configuration only; reachability is left to the health check.
//!
//! Integrations already started when a later one fails are not rolled back.
//!
//! # Example
//! ```no_run
//! use service_tooling::options::{with_log, with_trace, trace_exporter_url};
//! use service_tooling::telemetry::init;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let telemetry = init(
//!     "orders",
//!     "production",
//!     [with_log([]), with_trace([trace_exporter_url("otel-collector:4318")])],
//! )
//! .await?;
//! // ... application logic ...
//! telemetry.shutdown(); // ensure final spans exported
//! # Ok(()) }
//! ```
//!
//! # Shutdown
//! Call [`Telemetry::shutdown`] before exiting the Tokio runtime to flush Sentry and
//! any remaining span batches. Errors are logged, never returned, and repeated calls
//! are no-ops.
//!
//! # Threading Model
//! The batch span exporter runs on its own worker thread (blocking HTTP client). NATS
//! work (heartbeat, subscriptions) runs on Tokio tasks, so [`init`] must be called
//! from within a Tokio runtime.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, EnvFilter, Registry};

use crate::error::InitError;
use crate::healthz::{self, HealthState};
use crate::options::{Config, LogSettings, Opt, SentrySettings, TraceSettings};
use crate::{capture, nats, propagation, TRACER_NAME};

/// How long shutdown waits for queued Sentry events.
pub const SENTRY_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

type OtelLayer = OpenTelemetryLayer<Registry, SdkTracer>;
type OtelSlot = reload::Handle<Option<OtelLayer>, Registry>;

// Reload handle for the OpenTelemetry layer of the process-wide subscriber.
static OTEL_SLOT: OnceLock<OtelSlot> = OnceLock::new();

/// Handle to the integrations started by [`init`].
pub struct Telemetry {
    config: Arc<Config>,
    health: HealthState,
    nats: Option<async_nats::Client>,
    sentry: Option<sentry::ClientInitGuard>,
    tracer_provider: Option<SdkTracerProvider>,
    shut_down: AtomicBool,
}

impl Telemetry {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Health state shared with the heartbeat.
    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// Router serving `/healthz` for this handle.
    pub fn router(&self) -> Router {
        healthz::router(self.health())
    }

    /// NATS client, when NATS is enabled.
    pub fn nats(&self) -> Option<&async_nats::Client> {
        self.nats.as_ref()
    }

    /// See [`capture::capture_error`].
    pub fn capture_error<E>(&self, cx: &Context, err: Option<&E>, message: &str)
    where
        E: std::error::Error + 'static,
    {
        capture::capture_error(&self.config, cx, err, message);
    }

    /// Flush Sentry and shut down the tracer provider.
    ///
    /// Only the first call does any work. Provider errors are logged.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(guard) = &self.sentry {
            if !guard.flush(Some(SENTRY_FLUSH_TIMEOUT)) {
                tracing::warn!("Sentry flush timed out");
            }
        }
        if let Some(provider) = &self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::error!(error = %e, "Error shutting down tracer provider");
            }
        }
    }
}

/// Initialize every integration enabled by `opts`.
///
/// # Errors
/// Returns the first [`InitError`]: a missing required field is reported before any
/// network attempt, connection failures carry the vendor error as their source.
pub async fn init<I>(
    service_name: impl Into<String>,
    environment: impl Into<String>,
    opts: I,
) -> Result<Telemetry, InitError>
where
    I: IntoIterator<Item = Opt>,
{
    let config = Arc::new(Config::build(service_name, environment, opts));
    let health = HealthState::new(config.clone());

    let mut nats_client = None;
    if let Some(settings) = &config.nats {
        if settings.url.is_empty() {
            return Err(InitError::MissingNatsUrl);
        }
        let client = nats::connect(&settings.url)
            .await
            .map_err(InitError::NatsConnect)?;
        // Detached: the heartbeat runs for the life of the process.
        healthz::spawn_heartbeat(client.clone(), &config.service_name, health.clone());
        nats_client = Some(client);
    }

    if let Some(log) = &config.log {
        init_subscriber(Some(log));
    }
    if config.is_nats_enabled() {
        tracing::info!("NATS connected");
    }

    let sentry = match &config.sentry {
        Some(settings) => Some(init_sentry(settings, &config.environment)?),
        None => None,
    };

    let tracer_provider = match &config.trace {
        Some(settings) => Some(init_tracer(settings, &config)?),
        None => None,
    };

    if let Some(settings) = &config.mysql {
        if settings.dsn.is_empty() {
            return Err(InitError::MissingMysqlDsn);
        }
    }

    Ok(Telemetry {
        config,
        health,
        nats: nats_client,
        sentry,
        tracer_provider,
        shut_down: AtomicBool::new(false),
    })
}

// Installs Registry + reloadable OTel slot + EnvFilter + optional console layer.
// Only the first successful call in a process installs anything; nothing is
// installed while both logging and tracing are disabled.
fn init_subscriber(log: Option<&LogSettings>) {
    let level = log.map(|l| l.level).unwrap_or(tracing::Level::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    // Console formatting: plain compact single-line output.
    let fmt_layer = log.map(|_| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .compact()
    });
    let (otel_layer, slot) = reload::Layer::new(None::<OtelLayer>);

    match Registry::default()
        .with(otel_layer)
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            let _ = OTEL_SLOT.set(slot);
            tracing::info!(level = %level, console = log.is_some(), "logging initialized");
        }
        Err(e) => tracing::debug!(error = %e, "global subscriber already installed, keeping it"),
    }
}

fn init_sentry(
    settings: &SentrySettings,
    environment: &str,
) -> Result<sentry::ClientInitGuard, InitError> {
    if settings.dsn.is_empty() {
        tracing::warn!("Sentry DSN not set, Sentry will not be initialized");
        return Err(InitError::MissingSentryDsn);
    }
    let dsn: sentry::types::Dsn = settings.dsn.parse().map_err(InitError::SentryDsn)?;

    let environment = sentry_environment(settings, environment);
    let release = (!settings.release.is_empty()).then(|| settings.release.clone().into());

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        environment: Some(environment.clone().into()),
        release,
        attach_stacktrace: true,
        ..Default::default()
    });
    tracing::info!(environment = %environment, "Sentry initialized");
    Ok(guard)
}

// `environment` has already been resolved by `Config::build`.
fn sentry_environment(settings: &SentrySettings, environment: &str) -> String {
    if settings.environment.is_empty() {
        environment.to_string()
    } else {
        settings.environment.clone()
    }
}

fn init_tracer(settings: &TraceSettings, config: &Config) -> Result<SdkTracerProvider, InitError> {
    if settings.exporter_url.is_empty() {
        tracing::warn!("OpenTelemetry exporter URL not set, tracing will not be initialized");
        return Err(InitError::MissingExporterUrl);
    }

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attribute(KeyValue::new(
            "deployment.environment",
            config.environment.clone(),
        ))
        .build();

    // HTTP binary OTLP
    let span_exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(traces_endpoint(&settings.exporter_url))
        .build()
        .map_err(InitError::Exporter)?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_batch_exporter(span_exporter)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(tracer_provider.clone());
    propagation::install_propagator();

    if OTEL_SLOT.get().is_none() {
        init_subscriber(config.log.as_ref());
    }
    if let Some(slot) = OTEL_SLOT.get() {
        let layer =
            tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer(TRACER_NAME));
        if let Err(e) = slot.reload(Some(layer)) {
            tracing::warn!(error = %e, "could not attach OpenTelemetry layer to subscriber");
        }
    }

    tracing::info!(endpoint = %settings.exporter_url, "OpenTelemetry initialized");
    Ok(tracer_provider)
}

/// OTLP/HTTP traces URL for an exporter address given as `host:port` or a base URL.
fn traces_endpoint(exporter_url: &str) -> String {
    let base = exporter_url.trim_end_matches('/');
    let base = if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{base}")
    };
    format!("{base}/v1/traces")
}
