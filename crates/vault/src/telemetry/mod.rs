//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - **No image bytes, passwords or access keys** appear in any span
//!   attribute or log field. File names and sizes are fine.
//! - Log level is configurable via `WISS_LOG_LEVEL` (default: `info`), and
//!   `RUST_LOG` overrides it.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
