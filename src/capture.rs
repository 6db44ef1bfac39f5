// SPDX-License-Identifier: MIT
//! Error capture fanned out to Sentry, the active OpenTelemetry span and the log.
use std::error::Error;

use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use sentry::protocol::{Breadcrumb, Map, SpanStatus};
use sentry::Level;

use crate::options::Config;

/// Report `err` to every enabled sink. `None` is a no-op.
///
/// Sinks run in a fixed order (Sentry, span, log) and none of them can fail
/// the caller. The log line is always written.
///
/// ```
/// use opentelemetry::Context;
/// use service_tooling::capture::capture_error;
/// use service_tooling::options::Config;
///
/// let cfg = Config::build("svc", "test", []);
/// let err = std::io::Error::other("disk full");
/// capture_error(&cfg, &Context::current(), Some(&err), "writing report");
/// capture_error(&cfg, &Context::current(), None::<&std::io::Error>, "nothing to report");
/// ```
pub fn capture_error<E>(config: &Config, cx: &Context, err: Option<&E>, message: &str)
where
    E: Error + 'static,
{
    let Some(err) = err else {
        return;
    };

    if config.is_sentry_enabled() {
        tracing::error!(error = %err, description = message, "Sentry error capture");
        sentry::add_breadcrumb(error_breadcrumb(err, message));
        sentry::capture_error(err);
        if let Some(span) = sentry::configure_scope(|scope| scope.get_span()) {
            span.set_status(SpanStatus::InternalError);
        }
    }

    if config.is_trace_enabled() {
        tracing::error!(error = %err, description = message, "OpenTelemetry error capture");
        let span = cx.span();
        span.set_attribute(KeyValue::new("error.message", err.to_string()));
        span.set_attribute(KeyValue::new("error.description", message.to_string()));
        span.record_error(err);
        span.set_status(Status::error(err.to_string()));
    }

    tracing::error!(error = %err, description = message, "Error captured");
}

fn error_breadcrumb(err: &dyn Error, message: &str) -> Breadcrumb {
    let mut data = Map::new();
    data.insert("error".into(), err.to_string().into());
    data.insert("message".into(), message.into());
    Breadcrumb {
        category: Some("error".into()),
        message: Some(message.into()),
        data,
        level: Level::Error,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};

    use super::*;
    use crate::options::{self, Config};

    fn all_enabled() -> Config {
        Config::build(
            "capture-test",
            "test",
            [
                options::with_log([]),
                options::with_sentry([options::sentry_dsn("https://key@o1.ingest.sentry.io/1")]),
                options::with_trace([options::trace_exporter_url("localhost:4318")]),
                options::with_mysql([options::mysql_dsn("user:pass@tcp(127.0.0.1:3306)/db")]),
                options::with_nats([options::nats_url("nats://127.0.0.1:4222")]),
            ],
        )
    }

    #[test]
    fn none_is_a_noop_for_any_config() {
        for cfg in [Config::default(), all_enabled()] {
            capture_error(&cfg, &Context::new(), None::<&io::Error>, "nothing happened");
        }
    }

    #[test]
    fn capture_with_everything_disabled_only_logs() {
        let err = io::Error::other("boom");
        capture_error(&Config::default(), &Context::new(), Some(&err), "disabled sinks");
    }

    #[test]
    fn capture_without_sentry_client_does_not_panic() {
        // No Sentry client is bound, so the SDK calls are no-ops.
        let err = io::Error::other("boom");
        capture_error(&all_enabled(), &Context::new(), Some(&err), "unbound sentry");
    }

    fn attribute(span: &SpanData, key: &str) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }

    #[test]
    fn capture_records_error_on_span() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("capture-test");
        let cx = Context::new().with_span(tracer.start("work"));

        let err = io::Error::other("boom");
        capture_error(&all_enabled(), &cx, Some(&err), "while working");
        cx.span().end();

        let spans = exporter.get_finished_spans().expect("finished spans");
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.status, Status::error("boom"));
        assert_eq!(attribute(span, "error.message").as_deref(), Some("boom"));
        assert_eq!(
            attribute(span, "error.description").as_deref(),
            Some("while working")
        );
        assert_eq!(span.events.events.len(), 1);
    }

    #[test]
    fn capture_leaves_span_alone_when_tracing_disabled() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("capture-test");
        let cx = Context::new().with_span(tracer.start("work"));

        let err = io::Error::other("boom");
        capture_error(&Config::default(), &cx, Some(&err), "while working");
        cx.span().end();

        let spans = exporter.get_finished_spans().expect("finished spans");
        assert_eq!(spans[0].status, Status::Unset);
        assert!(spans[0].attributes.is_empty());
        assert!(spans[0].events.events.is_empty());
    }

    #[test]
    fn breadcrumb_carries_error_and_message() {
        let err = io::Error::other("boom");
        let crumb = error_breadcrumb(&err, "while working");
        assert_eq!(crumb.category.as_deref(), Some("error"));
        assert_eq!(crumb.level, Level::Error);
        assert_eq!(crumb.data.get("error").and_then(|v| v.as_str()), Some("boom"));
        assert_eq!(
            crumb.data.get("message").and_then(|v| v.as_str()),
            Some("while working")
        );
    }
}
