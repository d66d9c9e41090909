//! OpenTelemetry metrics for token lifecycles.
//!
//! Key metrics:
//! - courier_tokens_started_total: Counter of started tokens
//! - courier_token_outcomes_total: Counter of terminal outcomes, by `outcome`
//! - courier_exchange_latency_seconds: Histogram from start to completion
//! - courier_response_bytes: Histogram of completed body sizes

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::token::TokenPhase;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Courier metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub tokens_started: Counter<u64>,
    pub token_outcomes: Counter<u64>,
    pub exchange_latency: Histogram<f64>,
    pub response_bytes: Histogram<u64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            tokens_started: meter
                .u64_counter("courier_tokens_started_total")
                .with_description("Number of tokens that left the idle phase")
                .with_unit("1")
                .init(),
            token_outcomes: meter
                .u64_counter("courier_token_outcomes_total")
                .with_description("Terminal token outcomes")
                .with_unit("1")
                .init(),
            exchange_latency: meter
                .f64_histogram("courier_exchange_latency_seconds")
                .with_description("Time from start to completed network exchange")
                .with_unit("s")
                .init(),
            response_bytes: meter
                .u64_histogram("courier_response_bytes")
                .with_description("Body size of completed exchanges")
                .with_unit("By")
                .init(),
        }
    }
}

fn manual_provider() -> SdkMeterProvider {
    let reader = ManualReader::builder().build();
    SdkMeterProvider::builder().with_reader(reader).build()
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
/// Without an endpoint, metrics are recorded but not exported.
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, metrics stay local");
                    global::set_meter_provider(manual_provider());
                }
            }
        } else {
            global::set_meter_provider(manual_provider());
        }

        let meter = global::meter("courier");
        Metrics::new(&meter)
    });
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Record a token leaving the idle phase.
pub fn record_token_started() {
    if let Some(m) = METRICS.get() {
        m.tokens_started.add(1, &[]);
    }
}

/// Record a terminal outcome.
pub fn record_outcome(outcome: TokenPhase) {
    if let Some(m) = METRICS.get() {
        m.token_outcomes
            .add(1, &[KeyValue::new("outcome", outcome.as_str())]);
    }
}

/// Record a completed network exchange.
pub fn record_exchange(latency_seconds: f64, bytes: u64) {
    if let Some(m) = METRICS.get() {
        m.exchange_latency.record(latency_seconds, &[]);
        m.response_bytes.record(bytes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_before_init_is_noop() {
        // Must not panic whether or not another test initialized metrics.
        record_token_started();
        record_outcome(TokenPhase::Completed);
        record_exchange(0.01, 2);
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(METRICS.get().is_some());
        record_outcome(TokenPhase::Cancelled);
    }
}
