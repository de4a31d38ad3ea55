//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client accepted
//!     → queue.rs (wait in arrival order)
//!     → balancer.rs (match queue against idle connections, estimate demand)
//!     → pool.rs (pick node round robin, dial or hand out a pooled connection)
//!         - node.rs (per-backend pool, dial tracking, health state)
//!         - round_robin.rs (persistent rotation cursors)
//!     → session.rs (pair client with backend, pump bytes until either closes)
//! ```
//!
//! # Design Decisions
//! - Everything here is owned by one control loop; no locks
//! - Streams are routed events by id, so a stale event after teardown is a no-op
//! - Pooled connections are used once and never returned to the pool
//! - Inactive nodes are skipped for dialing only while health checks run

pub mod balancer;
pub mod error;
pub mod node;
pub mod pool;
pub mod queue;
pub mod round_robin;
pub mod session;
pub mod snapshot;

pub use balancer::{dial_estimate, Balancer, BalancerSettings};
pub use error::DialError;
pub use node::{DialTicket, Node, NodeSettings};
pub use pool::{Binding, NodePool};
pub use session::{Session, SessionTable, Side};
pub use snapshot::BalancerSnapshot;
