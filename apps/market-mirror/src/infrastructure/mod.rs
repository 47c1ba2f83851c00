//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port
//! interfaces defined in the application layer.

/// Configuration loading.
pub mod config;

/// Per-exchange feed decoders.
pub mod exchange;

/// Tracing setup.
pub mod telemetry;

/// Resilient WebSocket transport.
pub mod ws;
