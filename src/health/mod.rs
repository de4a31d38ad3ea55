//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Probe timer fires (runtime::timer)
//!     → Node::perform_active_check
//!     → ordinary dial through the node's Dialer
//!     → dial completion
//!     → state.rs: success → Active (timer cancelled)
//!                 failure → Inactive (timer restarted if none running)
//! ```
//!
//! # Design Decisions
//! - A probe is a plain dial; a successful probe's connection joins the
//!   idle pool instead of being thrown away
//! - Demand-driven dials feed the same state machine, so real traffic
//!   failures also take a node out of rotation
//! - Health state is per node, owned by the node

pub mod state;
