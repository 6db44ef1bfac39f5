// SPDX-License-Identifier: MIT
//! NATS helpers with Sentry breadcrumbs and OpenTelemetry context propagation.
//!
//! Outbound messages carry the caller's trace context in their headers;
//! subscriptions extract it again and hand each message to the user handler
//! together with a context holding a fresh `nats.receive.<subject>` span.
//!
//! ```no_run
//! use service_tooling::nats;
//! use opentelemetry::Context;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = nats::connect("nats://localhost:4222").await?;
//! let sub = nats::subscribe(&client, "orders.created", |_cx, msg| async move {
//!     tracing::info!(subject = %msg.subject, "order created");
//! })
//! .await?;
//! nats::publish(&Context::current(), &client, "orders.created", "42".into()).await?;
//! sub.unsubscribe();
//! # Ok(()) }
//! ```
use std::future::Future;

use async_nats::{Client, HeaderMap, Message, Subscriber};
use bytes::Bytes;
use futures_util::StreamExt;
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::{global, Context};
use sentry::protocol::{Breadcrumb, Map};
use tokio::task::JoinHandle;

use crate::propagation;
use crate::TRACER_NAME;

pub use async_nats::{ConnectError, PublishError, SubscribeError};

/// Connect to the NATS server(s) at `url`.
pub async fn connect(url: &str) -> Result<Client, ConnectError> {
    async_nats::connect(url).await
}

/// Check that a fresh connection to `url` can be established.
pub async fn check_connection(url: &str) -> Result<(), ConnectError> {
    let client = connect(url).await?;
    drop(client);
    Ok(())
}

/// Publish `payload` on `subject` inside a `nats.publish.<subject>` span.
pub async fn publish(
    cx: &Context,
    client: &Client,
    subject: &str,
    payload: Bytes,
) -> Result<(), PublishError> {
    publish_msg(cx, client, subject, None, payload).await
}

/// Like [`publish`], keeping any caller supplied headers.
pub async fn publish_msg(
    cx: &Context,
    client: &Client,
    subject: &str,
    headers: Option<HeaderMap>,
    payload: Bytes,
) -> Result<(), PublishError> {
    sentry::add_breadcrumb(breadcrumb("nats.publish", subject, &payload));

    let tracer = global::tracer(TRACER_NAME);
    let span = tracer
        .span_builder(format!("nats.publish.{subject}"))
        .with_kind(SpanKind::Producer)
        .start_with_context(&tracer, cx);
    let cx = cx.with_span(span);

    let headers = outbound_headers(&cx, headers);
    let result = client
        .publish_with_headers(subject.to_string(), headers, payload)
        .await;
    if let Err(e) = &result {
        cx.span().record_error(e);
    }
    cx.span().end();
    result
}

/// A running subscription. Dropping it leaves the dispatch task running.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop dispatching; the underlying subscriber is dropped with the task.
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Subscribe to `subject`, calling `handler` for every message with the
/// extracted trace context.
pub async fn subscribe<H, Fut>(
    client: &Client,
    subject: &str,
    handler: H,
) -> Result<Subscription, SubscribeError>
where
    H: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let subscriber = client.subscribe(subject.to_string()).await?;
    Ok(dispatch(subscriber, handler))
}

/// Queue group variant of [`subscribe`].
pub async fn queue_subscribe<H, Fut>(
    client: &Client,
    subject: &str,
    queue: &str,
    handler: H,
) -> Result<Subscription, SubscribeError>
where
    H: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let subscriber = client
        .queue_subscribe(subject.to_string(), queue.to_string())
        .await?;
    Ok(dispatch(subscriber, handler))
}

// Messages of one subscription are handled in delivery order.
fn dispatch<H, Fut>(mut subscriber: Subscriber, handler: H) -> Subscription
where
    H: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let tracer = global::tracer(TRACER_NAME);
        while let Some(msg) = subscriber.next().await {
            sentry::add_breadcrumb(breadcrumb("nats.receive", msg.subject.as_str(), &msg.payload));

            let parent = parent_context(msg.headers.as_ref());
            let span = tracer
                .span_builder(format!("nats.receive.{}", msg.subject))
                .with_kind(SpanKind::Consumer)
                .start_with_context(&tracer, &parent);
            let cx = parent.with_span(span);

            handler(cx.clone(), msg).await;
            cx.span().end();
        }
        tracing::debug!("nats subscription closed");
    });
    Subscription { task }
}

// Caller headers (or a fresh map) with the trace context of `cx` injected.
fn outbound_headers(cx: &Context, headers: Option<HeaderMap>) -> HeaderMap {
    let mut headers = headers.unwrap_or_default();
    propagation::inject_nats(cx, &mut headers);
    headers
}

fn parent_context(headers: Option<&HeaderMap>) -> Context {
    headers.map(propagation::extract_nats).unwrap_or_else(Context::new)
}

fn breadcrumb(category: &str, subject: &str, payload: &[u8]) -> Breadcrumb {
    let mut data = Map::new();
    data.insert("subject".into(), subject.into());
    data.insert("data".into(), String::from_utf8_lossy(payload).into_owned().into());
    Breadcrumb {
        category: Some(category.into()),
        message: Some(subject.into()),
        data,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    use super::*;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from_hex(TRACE_ID).unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    #[test]
    fn outbound_headers_are_created_when_absent() {
        propagation::install_propagator();
        let headers = outbound_headers(&remote_context(), None);
        let traceparent = headers.get("traceparent").map(|v| v.as_str());
        assert!(traceparent.is_some_and(|v| v.contains(TRACE_ID)));
    }

    #[test]
    fn outbound_headers_keep_caller_entries() {
        propagation::install_propagator();
        let mut caller = HeaderMap::new();
        caller.insert("Nats-Msg-Id", "order-42");
        let headers = outbound_headers(&remote_context(), Some(caller));
        assert_eq!(headers.get("Nats-Msg-Id").map(|v| v.as_str()), Some("order-42"));
        assert!(headers.get("traceparent").is_some());
    }

    #[test]
    fn parent_context_continues_publisher_trace() {
        propagation::install_propagator();
        let headers = outbound_headers(&remote_context(), None);
        let cx = parent_context(Some(&headers));
        assert_eq!(
            cx.span().span_context().trace_id(),
            TraceId::from_hex(TRACE_ID).unwrap()
        );
        assert!(cx.span().span_context().is_remote());
    }

    #[test]
    fn parent_context_without_headers_is_empty() {
        let cx = parent_context(None);
        assert!(!cx.span().span_context().is_valid());
    }

    #[tokio::test]
    async fn check_connection_rejects_bad_urls() {
        assert!(check_connection("").await.is_err());
        assert!(check_connection("invalid-url").await.is_err());
    }

    #[tokio::test]
    async fn check_connection_rejects_unreachable_server() {
        assert!(check_connection("nats://127.0.0.1:9999").await.is_err());
    }

    #[test]
    fn breadcrumb_records_subject_and_payload() {
        let crumb = breadcrumb("nats.publish", "orders.created", b"42");
        assert_eq!(crumb.category.as_deref(), Some("nats.publish"));
        assert_eq!(crumb.message.as_deref(), Some("orders.created"));
        assert_eq!(crumb.data.get("data").and_then(|v| v.as_str()), Some("42"));
        assert_eq!(
            crumb.data.get("subject").and_then(|v| v.as_str()),
            Some("orders.created")
        );
    }
}
