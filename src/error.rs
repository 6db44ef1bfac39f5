// SPDX-License-Identifier: MIT
//! Errors returned by [`crate::telemetry::init`].
//!
//! Configuration variants are raised before any network attempt. Connection
//! variants carry the vendor error as their source, behind a stable prefix
//! naming the failing integration.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("nats URL is required")]
    MissingNatsUrl,
    #[error("nats connection failed: {0}")]
    NatsConnect(#[source] async_nats::ConnectError),

    #[error("sentry DSN is required")]
    MissingSentryDsn,
    #[error("sentry initialization failed: {0}")]
    SentryDsn(#[source] sentry::types::ParseDsnError),

    #[error("OpenTelemetry Exporter URL is required")]
    MissingExporterUrl,
    #[error("OpenTelemetry exporter initialization failed: {0}")]
    Exporter(#[source] opentelemetry_otlp::ExporterBuildError),

    #[error("mysql DSN is required")]
    MissingMysqlDsn,
}

impl InitError {
    /// `true` for errors detected from configuration alone.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            InitError::MissingNatsUrl
                | InitError::MissingSentryDsn
                | InitError::MissingExporterUrl
                | InitError::MissingMysqlDsn
        )
    }
}
