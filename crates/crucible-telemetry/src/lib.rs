//! Observability for the crucible execution engine.
//!
//! Structured logging via the `tracing` ecosystem (human-readable and JSON
//! formats) plus a small in-process metrics collector with Prometheus text
//! export. The session drivers count executions, restarts, and shell
//! timeouts through the global collector.

pub mod logging;
pub mod metrics;
