// SPDX-License-Identifier: MIT
//! Composite health check and NATS heartbeat.
//!
//! [`HealthState::check`] walks the enabled dependencies in a fixed order and
//! reports the first failure:
//!
//! 1. MySQL reachable (`500` otherwise)
//! 2. NATS reachable (`500` otherwise), a heartbeat event seen at all (`503`)
//!    and seen within [`STALE_AFTER`] (`503`)
//!
//! Every call opens fresh probe connections; nothing is cached between calls.
//! The heartbeat publishes on `<service>.healthz` every
//! [`HEARTBEAT_INTERVAL`] and records each echo it receives.
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use crate::options::Config;
use crate::{mysql, nats};

/// Delay between two heartbeat publishes.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Maximum age of the last heartbeat event before the service is unhealthy.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

const HEARTBEAT_PAYLOAD: &[u8] = b"Health check event";
const HEALTHY_BODY: &str = r#"{"status": "ok", "message": "Service is healthy"}"#;
const NO_EVENT: i64 = i64::MIN;

/// Connectivity probes used by the health check.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn mysql(&self, dsn: &str) -> anyhow::Result<()>;
    async fn nats(&self, url: &str) -> anyhow::Result<()>;
}

/// Probes that open real connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct LiveProbe;

#[async_trait]
impl Probe for LiveProbe {
    async fn mysql(&self, dsn: &str) -> anyhow::Result<()> {
        Ok(mysql::check_connection(dsn).await?)
    }

    async fn nats(&self, url: &str) -> anyhow::Result<()> {
        Ok(nats::check_connection(url).await?)
    }
}

/// Shared state behind the `/healthz` endpoint.
#[derive(Clone)]
pub struct HealthState {
    config: Arc<Config>,
    probe: Arc<dyn Probe>,
    last_event: Arc<AtomicI64>,
}

impl HealthState {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_probe(config, Arc::new(LiveProbe))
    }

    pub fn with_probe(config: Arc<Config>, probe: Arc<dyn Probe>) -> Self {
        Self {
            config,
            probe,
            last_event: Arc::new(AtomicI64::new(NO_EVENT)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record a heartbeat event received now.
    pub fn record_event(&self) {
        self.record_event_at(Utc::now());
    }

    pub fn record_event_at(&self, at: DateTime<Utc>) {
        self.last_event.store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        match self.last_event.load(Ordering::Acquire) {
            NO_EVENT => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    /// Run the enabled checks in order and report the first failure.
    pub async fn check(&self) -> HealthReport {
        if let Some(mysql) = &self.config.mysql {
            if let Err(e) = self.probe.mysql(&mysql.dsn).await {
                tracing::error!(error = %e, "MySQL connection check failed");
                return HealthReport::failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("MySQL connection failed: {e}"),
                );
            }
        }

        if let Some(nats) = &self.config.nats {
            if let Err(e) = self.probe.nats(&nats.url).await {
                tracing::error!(error = %e, "NATS connection check failed");
                return HealthReport::failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("NATS connection failed: {e}"),
                );
            }

            let Some(last_event) = self.last_event() else {
                tracing::warn!("No health check event received yet");
                return HealthReport::failure(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "No health check event received yet".to_string(),
                );
            };

            let age = Utc::now().signed_duration_since(last_event);
            if age.num_milliseconds() > STALE_AFTER.as_millis() as i64 {
                tracing::warn!(last_event = %last_event.to_rfc3339(), "Last health check event is older than 5 minutes");
                return HealthReport::failure(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Last health check event is older than 5 minutes".to_string(),
                );
            }

            tracing::debug!(last_event = %last_event.to_rfc3339(), "Health check event received");
        }

        HealthReport::healthy()
    }
}

/// Outcome of a health check, rendered as an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub status: StatusCode,
    pub body: String,
}

impl HealthReport {
    fn healthy() -> Self {
        Self {
            status: StatusCode::OK,
            body: HEALTHY_BODY.to_string(),
        }
    }

    fn failure(status: StatusCode, body: String) -> Self {
        Self { status, body }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == StatusCode::OK
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let content_type = if self.is_healthy() {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };
        (self.status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// `/healthz` handler; accepts any method.
pub async fn healthz(State(state): State<HealthState>) -> HealthReport {
    state.check().await
}

/// Router serving [`healthz`] at `/healthz`.
pub fn router(state: HealthState) -> Router {
    Router::new().route("/healthz", any(healthz)).with_state(state)
}

/// Publish a heartbeat on `<service_name>.healthz` and record each echo in `state`.
///
/// The loop runs until a subscribe or publish error, or until the handle is aborted.
pub fn spawn_heartbeat(
    client: async_nats::Client,
    service_name: &str,
    state: HealthState,
) -> JoinHandle<()> {
    let subject = format!("{service_name}.healthz");
    tokio::spawn(async move {
        let mut subscriber = match client.subscribe(subject.clone()).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Error subscribing to health check event");
                return;
            }
        };
        tokio::spawn(async move {
            while subscriber.next().await.is_some() {
                state.record_event();
            }
        });

        loop {
            if let Err(e) = client
                .publish(subject.clone(), Bytes::from_static(HEARTBEAT_PAYLOAD))
                .await
            {
                tracing::error!(error = %e, subject = %subject, "Error publishing health check event");
                return;
            }
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    })
}
