// SPDX-License-Identifier: MIT
//! W3C Trace Context + Baggage propagation over HTTP and NATS headers.
//!
//! Extraction and injection go through the global text map propagator, which
//! [`install_propagator`] sets when tracing is initialized. Until then the
//! global propagator is a no-op and every helper here does nothing.
use opentelemetry::propagation::{Extractor, Injector, TextMapCompositePropagator};
use opentelemetry::{global, Context};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// Install the composite TraceContext + Baggage propagator globally.
pub fn install_propagator() {
    let propagator = TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]);
    global::set_text_map_propagator(propagator);
}

/// Parent context carried by inbound HTTP headers (empty context if none).
pub fn extract_http(headers: &http::HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HttpExtractor(headers)))
}

/// Write the trace context of `cx` into outbound HTTP headers.
pub fn inject_http(cx: &Context, headers: &mut http::HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HttpInjector(headers))
    });
}

/// Parent context carried by NATS message headers.
pub fn extract_nats(headers: &async_nats::HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&NatsExtractor(headers)))
}

/// Write the trace context of `cx` into NATS message headers.
pub fn inject_nats(cx: &Context, headers: &mut async_nats::HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut NatsInjector(headers))
    });
}

struct HttpExtractor<'a>(&'a http::HeaderMap);

impl Extractor for HttpExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

struct HttpInjector<'a>(&'a mut http::HeaderMap);

impl Injector for HttpInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let name = match http::HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Failed to create header name for trace injection: {:?}", e);
                return;
            }
        };
        let val = match http::HeaderValue::from_str(&value) {
            Ok(val) => val,
            Err(e) => {
                tracing::debug!("Failed to create header value for trace injection: {:?}", e);
                return;
            }
        };
        self.0.insert(name, val);
    }
}

struct NatsExtractor<'a>(&'a async_nats::HeaderMap);

impl Extractor for NatsExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .map(|(name, _)| <async_nats::header::HeaderName as AsRef<str>>::as_ref(name))
            .collect()
    }
}

struct NatsInjector<'a>(&'a mut async_nats::HeaderMap);

impl Injector for NatsInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value);
    }
}
