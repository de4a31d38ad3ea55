//! Outbound connection establishment.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpSocket;

use crate::load_balancer::error::DialError;
use crate::load_balancer::node::DialTicket;
use crate::net::stream::SendStream;
use crate::net::tcp::TcpStream;
use crate::runtime::event::EventSender;

/// Dial capability for one fixed backend address.
///
/// `dial` returns as soon as the attempt is under way. Exactly one
/// completion for `ticket` must follow later, carrying either a connected
/// stream or nothing. The dialer owns the timeout: an attempt that exceeds
/// it is aborted and reported as a failure.
pub trait Dialer {
    fn address(&self) -> SocketAddr;

    fn dial(&mut self, timeout: Duration, ticket: DialTicket) -> Result<(), DialError>;
}

/// Plain TCP dialer reporting completions through the control loop's
/// event channel.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: SocketAddr,
    events: EventSender,
}

impl TcpDialer {
    pub fn new(address: SocketAddr, events: EventSender) -> Self {
        Self { address, events }
    }
}

impl Dialer for TcpDialer {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn dial(&mut self, timeout: Duration, ticket: DialTicket) -> Result<(), DialError> {
        // Descriptor exhaustion fails socket creation here and reaches the
        // caller. Running out of ephemeral ports only shows up in `connect`
        // below, so it is reported as an ordinary failed dial.
        let socket = match self.address {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|source| DialError::ResourceExhausted {
            address: self.address,
            source,
        })?;

        let address = self.address;
        let events = self.events.clone();
        tokio::spawn(async move {
            let stream: Option<SendStream> =
                match tokio::time::timeout(timeout, socket.connect(address)).await {
                    Ok(Ok(connected)) => {
                        Some(Box::new(TcpStream::spawn(connected, address, events.clone())))
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(node = ticket.node, address = %address, error = %e, "Dial failed");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(node = ticket.node, address = %address, "Dial timed out");
                        None
                    }
                };
            events.dialed(ticket, stream);
        });
        Ok(())
    }
}
