// SPDX-License-Identifier: MIT
//! Instrumentation and configuration glue for Rust services.
//!
//! This library wires a fixed set of integrations behind option-based initialization:
//! * Console logging through `tracing` + `tracing-subscriber`.
//! * Distributed tracing with OpenTelemetry (OTLP/HTTP span export, W3C propagation).
//! * Error reporting with Sentry.
//! * NATS messaging with traced publish/subscribe and a liveness heartbeat.
//! * MySQL reachability for the health check.
//!
//! The primary entry points are [`telemetry::init`], the option functions in [`options`]
//! and the returned [`telemetry::Telemetry`] handle. Request and message adapters live in
//! [`http`](crate::http) and [`nats`]; the `/healthz` endpoint lives in [`healthz`].
//!
//! # Quick Start
//! ```no_run
//! use service_tooling::{env, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let telemetry = telemetry::init("orders", "", env::options_from_env()).await?;
//!     let app = telemetry.router();
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     telemetry.shutdown();
//!     Ok(())
//! }
//! ```
pub mod capture;
pub mod env;
pub mod error;
pub mod healthz;
pub mod http;
pub mod k8s;
pub mod mysql;
pub mod nats;
pub mod options;
pub mod propagation;
pub mod telemetry;

pub use capture::capture_error;
pub use error::InitError;
pub use telemetry::{init, Telemetry};

/// Instrumentation scope of every span this crate starts.
pub const TRACER_NAME: &str = "service-tooling";
