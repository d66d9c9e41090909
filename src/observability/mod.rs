//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via `tracing-subscriber`
//! - OpenTelemetry metrics for token outcomes and exchanges

pub mod metrics;
pub mod tracing;
