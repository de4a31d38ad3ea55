//! Events delivered to the control loop.

use tokio::sync::mpsc;

use crate::load_balancer::node::DialTicket;
use crate::net::connection::ConnectionId;
use crate::net::stream::{SendStream, StreamEvent, StreamEventKind};
use crate::runtime::timer::{TimerId, TimerKind};

/// Everything that can wake the control loop.
pub enum Event {
    /// An accepted, connected client stream.
    Incoming(SendStream),
    /// Readiness change on a stream.
    Stream(StreamEvent),
    /// Outcome of a dial attempt. `None` is a failure or timeout.
    Dialed(DialTicket, Option<SendStream>),
    /// A scheduled timer fired.
    Timer(TimerId, TimerKind),
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Incoming(stream) => f.debug_tuple("Incoming").field(&stream.id()).finish(),
            Event::Stream(event) => f.debug_tuple("Stream").field(event).finish(),
            Event::Dialed(ticket, stream) => f
                .debug_tuple("Dialed")
                .field(ticket)
                .field(&stream.as_ref().map(|s| s.id()))
                .finish(),
            Event::Timer(id, kind) => f.debug_tuple("Timer").field(id).field(kind).finish(),
        }
    }
}

/// Create the control loop's event channel.
pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

/// Cloneable handle I/O tasks and timers use to reach the control loop.
///
/// Sends never fail loudly: once the loop is gone there is nobody left to
/// tell, so a closed channel is ignored.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    pub fn incoming(&self, stream: SendStream) {
        let _ = self.0.send(Event::Incoming(stream));
    }

    pub fn stream(&self, id: ConnectionId, kind: StreamEventKind) {
        let _ = self.0.send(Event::Stream(StreamEvent { id, kind }));
    }

    pub fn dialed(&self, ticket: DialTicket, stream: Option<SendStream>) {
        let _ = self.0.send(Event::Dialed(ticket, stream));
    }

    pub fn timer(&self, id: TimerId, kind: TimerKind) {
        let _ = self.0.send(Event::Timer(id, kind));
    }

    /// True once the control loop dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}
