//! The stream capability.
//!
//! The balancer core never sees sockets. It sees [`Stream`]: a duplex,
//! non-blocking byte channel that buffers on both sides and reports
//! readiness through [`StreamEvent`]s tagged with its [`ConnectionId`].
//! Plain TCP and any TLS wrapper are interchangeable implementations.
//!
//! # Ownership
//! Whoever holds the `Box<dyn Stream>` owns it. Dropping it releases
//! ownership only: an implementation must keep flushing bytes already
//! queued with [`Stream::write`] and close on its own once they are sent.
//! [`Stream::abort`] is the only way to discard queued bytes.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::net::connection::ConnectionId;

/// A duplex byte channel owned by the control loop.
pub trait Stream {
    /// Identity used to route readiness events.
    fn id(&self) -> ConnectionId;

    /// Remote endpoint, when known.
    fn remote(&self) -> Option<SocketAddr>;

    /// Queue a chunk for sending. Never blocks.
    fn write(&mut self, chunk: Bytes);

    /// Take the next buffered inbound chunk.
    fn read_next(&mut self) -> Option<Bytes>;

    /// Size of the next buffered inbound chunk, 0 when nothing is buffered.
    fn next_size(&mut self) -> usize;

    /// Whether a write now would be accepted without exceeding the
    /// stream's own buffering limit.
    fn is_writable(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Whether bytes accepted by `write` are still waiting to go out.
    fn has_unsent_data(&self) -> bool;

    /// Graceful close: stop accepting writes, flush what is queued, then
    /// close the transport.
    fn close(&mut self);

    /// Immediate close. Queued bytes are discarded.
    fn abort(&mut self);
}

/// A stream as held by the control loop.
pub type BoxStream = Box<dyn Stream>;

/// A stream that can cross from an I/O task into the control loop.
pub type SendStream = Box<dyn Stream + Send>;

/// Readiness notification for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEvent {
    pub id: ConnectionId,
    pub kind: StreamEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    /// New inbound data is buffered.
    Readable,
    /// The outbound buffer drained below its limit.
    Writable,
    /// The transport closed (EOF, reset or write failure).
    Closed,
}
