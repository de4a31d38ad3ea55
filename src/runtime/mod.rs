//! Single-threaded event loop plumbing.
//!
//! # Data Flow
//! ```text
//! Listener, stream tasks, dialers, timers
//!     → event.rs (one unbounded channel)
//!     → driver.rs (dispatch to the balancer, one event at a time)
//! ```
//!
//! # Design Decisions
//! - The balancer never leaves the driver's task, so it needs no locks
//! - Timers are identified by id; an expiry for a timer no longer owned is ignored

pub mod driver;
pub mod event;
pub mod timer;

pub use event::{Event, EventSender};
pub use timer::{Scheduler, TimerId, TimerKind, TokioScheduler};
