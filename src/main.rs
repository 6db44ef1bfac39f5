// SPDX-License-Identifier: MIT
use anyhow::Result;
use axum::extract::Request;
use axum::routing::get;
use opentelemetry::Context;
use service_tooling::http::wrap_handler;
use service_tooling::{env, k8s, telemetry};
use tracing::info;

async fn hello(cx: Context, _req: Request) -> &'static str {
    use opentelemetry::trace::TraceContextExt;
    info!(trace_id = %cx.span().span_context().trace_id(), "hello");
    "hello\n"
}

#[tokio::main]
async fn main() -> Result<()> {
    let service =
        std::env::var("SERVICE_NAME").unwrap_or_else(|_| "service-tooling".to_string());
    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let telemetry = telemetry::init(
        service,
        k8s::detect_environment(),
        env::options_from_env(),
    )
    .await?;
    info!(%addr, "application started");

    let app = telemetry
        .router()
        .route("/hello", get(wrap_handler(hello, "hello")));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down");
    telemetry.shutdown();
    Ok(())
}
