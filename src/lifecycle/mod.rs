//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Event channel + timers → Balancer with nodes → Listener → Control loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close sessions and queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, then tear down the balancer

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
