//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured log lines)
//!     → metrics.rs helpers (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber (installed by the binary)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Logging goes through `tracing`; the binary installs the subscriber
//! - Metric helpers are no-ops until an exporter is installed, so the
//!   library never forces one on embedders

pub mod metrics;
