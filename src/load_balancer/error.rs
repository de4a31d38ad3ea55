//! Load balancer error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised synchronously while issuing a dial.
///
/// A refused or timed out connection is not an error here: it arrives later
/// as a failed dial completion and only affects the node's health state.
#[derive(Debug, Error)]
pub enum DialError {
    /// The local side ran out of something needed to open a connection
    /// (ephemeral ports, file descriptors, buffers).
    #[error("out of local resources dialing {address}: {source}")]
    ResourceExhausted {
        /// Node being dialed.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
