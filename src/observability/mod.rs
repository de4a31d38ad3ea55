//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Control loop and network tasks produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event; no formatted-string logs
//! - Metric updates are fire-and-forget and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
