// SPDX-License-Identifier: MIT
//! HTTP adapters that carry OpenTelemetry context across service boundaries.
//!
//! * [`wrap_handler`] – axum handler that continues the caller's trace.
//! * [`do_request`] – `reqwest` call that propagates the current trace.
//!
//! Both rely on the global propagator installed by [`crate::telemetry::init`]
//! when tracing is enabled.
//!
//! # Example
//! ```no_run
//! use axum::{extract::Request, routing::get, Router};
//! use opentelemetry::Context;
//! use service_tooling::http::wrap_handler;
//!
//! async fn hello(_cx: Context, _req: Request) -> &'static str {
//!     "hello"
//! }
//!
//! let app: Router = Router::new().route("/hello", get(wrap_handler(hello, "hello")));
//! ```
use std::borrow::Cow;
use std::future::Future;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::{global, Context};

use crate::propagation;
use crate::TRACER_NAME;

/// Wrap `inner` so every request runs inside a server span named `span_name`.
///
/// The span is a child of the context found in the request headers. `inner`
/// receives the derived context and the span ends when `inner` returns.
/// Panics are not caught here; the span is ended while unwinding.
pub fn wrap_handler<H, Fut, R>(
    inner: H,
    span_name: impl Into<Cow<'static, str>>,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    H: Fn(Context, Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    let span_name = span_name.into();
    move |req: Request| {
        let inner = inner.clone();
        let span_name = span_name.clone();
        async move {
            let parent = propagation::extract_http(req.headers());
            let tracer = global::tracer(TRACER_NAME);
            let span = tracer
                .span_builder(span_name)
                .with_kind(SpanKind::Server)
                .start_with_context(&tracer, &parent);
            let cx = parent.with_span(span);

            let response = inner(cx.clone(), req).await.into_response();
            cx.span().end();
            response
        }
        .boxed()
    }
}

/// Execute `request` through `client` inside a client span named `span_name`.
///
/// The span's context is injected into the request headers. The response is
/// returned unchanged, so HTTP error statuses are not treated as failures;
/// transport errors are recorded on the span.
pub async fn do_request(
    cx: &Context,
    client: &reqwest::Client,
    mut request: reqwest::Request,
    span_name: impl Into<Cow<'static, str>>,
) -> reqwest::Result<reqwest::Response> {
    let tracer = global::tracer(TRACER_NAME);
    let span = tracer
        .span_builder(span_name)
        .with_kind(SpanKind::Client)
        .start_with_context(&tracer, cx);
    let cx = cx.with_span(span);

    propagation::inject_http(&cx, request.headers_mut());

    let result = client.execute(request).await;
    if let Err(e) = &result {
        cx.span().record_error(e);
    }
    cx.span().end();
    result
}
