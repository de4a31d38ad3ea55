//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tcp.rs (reader/writer tasks, readiness events)
//!     → Hand off to the control loop as a client stream
//!
//! Outgoing TCP connection
//!     → dialer.rs (socket allocation, connect with timeout)
//!     → tcp.rs
//!     → Hand off to the control loop as a dial completion
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - The control loop sees streams only through the `Stream` trait
//! - Every stream gets a process-unique id used to route its events

pub mod connection;
pub mod dialer;
pub mod listener;
pub mod stream;
pub mod tcp;

pub use connection::ConnectionId;
pub use stream::{BoxStream, Stream, StreamEvent, StreamEventKind};
