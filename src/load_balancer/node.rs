//! Backend node abstraction.
//!
//! # Responsibilities
//! - Represent a single configured backend address
//! - Own the idle pool of pre-established connections
//! - Issue dials and account for the ones in flight
//! - Drive the node's health state from dial outcomes

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::health::state::{HealthCheck, HealthState, ProbeSchedule};
use crate::load_balancer::error::DialError;
use crate::net::dialer::Dialer;
use crate::net::stream::BoxStream;
use crate::observability::metrics;
use crate::runtime::timer::{Scheduler, TimerId};

/// Identifies one dial attempt so its completion is matched exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialTicket {
    /// Index of the dialing node.
    pub node: usize,
    /// Per-node attempt sequence number.
    pub attempt: u64,
}

/// Per-node settings shared by every node of a pool.
#[derive(Debug, Clone, Copy)]
pub struct NodeSettings {
    pub active_check: bool,
    pub probe: ProbeSchedule,
    pub connect_timeout: Duration,
}

/// A single backend node.
pub struct Node {
    index: usize,
    name: String,
    dialer: Box<dyn Dialer>,
    /// Idle connections; the most recently added is reused first.
    pool: Vec<BoxStream>,
    health: HealthCheck,
    connecting: HashSet<u64>,
    next_attempt: u64,
    connect_timeout: Duration,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("index", &self.index)
            .field("address", &self.address())
            .field("idle", &self.pool.len())
            .field("connecting", &self.connecting.len())
            .field("health", &self.health.state())
            .finish()
    }
}

impl Node {
    pub fn new(
        index: usize,
        name: impl Into<String>,
        dialer: Box<dyn Dialer>,
        settings: NodeSettings,
        scheduler: &mut dyn Scheduler,
    ) -> Self {
        let health = HealthCheck::new(index, settings.active_check, settings.probe, scheduler);
        Self {
            index,
            name: name.into(),
            dialer,
            pool: Vec::new(),
            health,
            connecting: HashSet::new(),
            next_attempt: 0,
            connect_timeout: settings.connect_timeout,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> SocketAddr {
        self.dialer.address()
    }

    /// Dials currently in flight.
    pub fn connection_attempts(&self) -> usize {
        self.connecting.len()
    }

    /// Idle pooled connections, including any not yet found stale.
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn is_active(&self) -> bool {
        self.health.is_active()
    }

    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    pub fn active_check(&self) -> bool {
        self.health.enabled()
    }

    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.health.owns_timer(id)
    }

    /// Open one more connection to this node.
    pub fn connect(&mut self) -> Result<DialTicket, DialError> {
        let ticket = DialTicket {
            node: self.index,
            attempt: self.next_attempt,
        };
        self.dialer.dial(self.connect_timeout, ticket)?;
        self.next_attempt += 1;
        self.connecting.insert(ticket.attempt);
        tracing::trace!(node = self.index, attempt = ticket.attempt, "Dial issued");
        Ok(ticket)
    }

    /// Probe timer fired: a probe is an ordinary dial.
    pub fn perform_active_check(&mut self) {
        if let Err(e) = self.connect() {
            // Most likely local exhaustion; the next probe tries again.
            tracing::debug!(node = self.index, error = %e, "Health probe not issued");
        }
    }

    /// Apply the outcome of a dial. Returns true when a connection joined
    /// the idle pool.
    pub fn complete_dial(
        &mut self,
        attempt: u64,
        stream: Option<BoxStream>,
        scheduler: &mut dyn Scheduler,
    ) -> bool {
        if !self.connecting.remove(&attempt) {
            // Already settled: a late completion counts for nothing.
            tracing::debug!(node = self.index, attempt, "Ignoring completion for unknown dial");
            if let Some(mut stream) = stream {
                stream.abort();
            }
            return false;
        }

        match stream {
            Some(stream) if stream.is_connected() => {
                self.pool.push(stream);
                if self.health.mark_active(scheduler) {
                    tracing::info!(node = self.index, address = %self.address(), "Node is active");
                    metrics::record_node_active(&self.name, true);
                }
                tracing::debug!(node = self.index, idle = self.pool.len(), "Node connected");
                true
            }
            other => {
                if let Some(mut stale) = other {
                    stale.close();
                }
                if self.health.mark_inactive(scheduler) {
                    tracing::warn!(node = self.index, address = %self.address(), "Node is inactive");
                    metrics::record_node_active(&self.name, false);
                } else {
                    tracing::debug!(node = self.index, idle = self.pool.len(), "Node failed to connect");
                }
                false
            }
        }
    }

    /// Take an idle connection, closing any found already disconnected.
    pub fn get_connection(&mut self) -> Option<BoxStream> {
        while let Some(mut conn) = self.pool.pop() {
            if conn.is_connected() {
                return Some(conn);
            }
            tracing::debug!(node = self.index, connection_id = %conn.id(), "Discarding stale pooled connection");
            conn.close();
        }
        None
    }

    /// Stop probing and drop every pooled connection.
    pub fn shutdown(&mut self, scheduler: &mut dyn Scheduler) {
        self.health.stop(scheduler);
        for mut conn in self.pool.drain(..) {
            conn.close();
        }
    }
}
