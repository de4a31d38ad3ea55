//! Admission and control loop.
//!
//! # Responsibilities
//! - Queue accepted clients until a backend connection is available
//! - Match the queue against idle pooled connections, in arrival order
//! - Estimate how many new dials the current demand justifies
//! - Back off when dialing fails for lack of local resources
//! - Route stream, dial and timer events to their owners

use std::time::Duration;

use crate::config::BalancerConfig;
use crate::health::state::ProbeSchedule;
use crate::load_balancer::{
    node::{DialTicket, NodeSettings},
    pool::{Binding, NodePool},
    queue::WaitQueue,
    snapshot::BalancerSnapshot,
};
use crate::net::dialer::Dialer;
use crate::net::stream::{BoxStream, StreamEvent, StreamEventKind};
use crate::observability::metrics;
use crate::runtime::timer::{Scheduler, TimerId, TimerKind};

/// Control loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct BalancerSettings {
    /// Upper bound on dials issued per round.
    pub max_outgoing_attempts: usize,
    /// Delay before retrying after a resource-exhaustion dial error.
    pub connect_retry: Duration,
    pub nodes: NodeSettings,
}

impl BalancerSettings {
    pub fn from_config(config: &BalancerConfig) -> Self {
        Self {
            max_outgoing_attempts: config.balancer.max_outgoing_attempts,
            connect_retry: config.balancer.connect_retry(),
            nodes: NodeSettings {
                active_check: config.health_check.enabled,
                probe: ProbeSchedule {
                    initial_delay: config.health_check.initial_delay(),
                    interval: config.health_check.interval(),
                },
                connect_timeout: config.timeouts.connect(),
            },
        }
    }
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self::from_config(&BalancerConfig::default())
    }
}

/// Number of new dials to issue for the current demand.
///
/// In-flight dials are discounted twice: once as capacity about to arrive
/// and once more against the per-round cap.
pub fn dial_estimate(queued: usize, connecting: usize, idle: usize, max_attempts: usize) -> usize {
    let estimate = queued as i64 - (connecting + idle) as i64;
    let estimate = estimate.min(max_attempts as i64);
    (estimate - connecting as i64).max(0) as usize
}

/// The load balancer.
///
/// Owned by one control loop for its whole life. All methods run to
/// completion on that loop; nothing here is shared or locked.
pub struct Balancer {
    settings: BalancerSettings,
    nodes: NodePool,
    queue: WaitQueue,
    scheduler: Box<dyn Scheduler>,
    retry_timer: Option<TimerId>,
    dial_failures: u64,
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("queue", &self.queue.len())
            .field("dial_failures", &self.dial_failures)
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl Balancer {
    pub fn new(settings: BalancerSettings, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            settings,
            nodes: NodePool::new(settings.nodes),
            queue: WaitQueue::new(),
            scheduler,
            retry_timer: None,
            dial_failures: 0,
        }
    }

    /// Register a backend. With health checks enabled its first probe is
    /// scheduled immediately.
    pub fn add_node(&mut self, name: impl Into<String>, dialer: Box<dyn Dialer>) -> usize {
        self.nodes.add_node(name, dialer, self.scheduler.as_mut())
    }

    pub fn nodes(&self) -> &NodePool {
        &self.nodes
    }

    pub fn queue(&self) -> &WaitQueue {
        &self.queue
    }

    /// Clients currently waiting.
    pub fn wait_queue(&self) -> usize {
        self.queue.len()
    }

    /// Dial rounds that failed for lack of local resources.
    pub fn dial_failures(&self) -> u64 {
        self.dial_failures
    }

    pub fn settings(&self) -> &BalancerSettings {
        &self.settings
    }

    /// Observe session teardown with `(index, open, total)`.
    pub fn set_on_session_close(&mut self, hook: impl FnMut(usize, usize, u64) + 'static) {
        self.nodes.set_on_session_close(hook);
    }

    /// Whether a resource-exhaustion retry is pending.
    pub fn retry_pending(&self) -> bool {
        self.retry_timer.is_some()
    }

    /// Admit a connected client stream and try to serve it right away.
    pub fn incoming(&mut self, conn: BoxStream) {
        let id = conn.id();
        self.nodes.bind(id, Binding::Waiting);
        self.queue.push_back(conn);
        tracing::debug!(connection_id = %id, queued = self.queue.len(), "Queueing connection");
        self.handle_queue();
    }

    /// Match waiting clients with idle connections, then top up the pool.
    pub fn handle_queue(&mut self) {
        while self.nodes.pool_size() > 0 && !self.queue.is_empty() {
            let Some(conn) = self.queue.take_front() else {
                if let Some(gone) = self.queue.pop_front() {
                    self.nodes.unbind(gone.id());
                }
                continue;
            };
            match self.nodes.assign(conn) {
                None => {
                    if let Some(served) = self.queue.pop_front() {
                        tracing::trace!(
                            connection_id = %served.id(),
                            waited_ms = served.waited().as_millis() as u64,
                            "Client served"
                        );
                    }
                }
                Some(conn) => self.queue.restore_front(conn),
            }
        }
        self.handle_connections();
    }

    /// Estimate demand and issue new dials for it.
    pub fn handle_connections(&mut self) {
        // Any run is a retry in its own right.
        if let Some(timer) = self.retry_timer.take() {
            self.scheduler.cancel(timer);
        }

        for id in self.queue.prune() {
            self.nodes.unbind(id);
        }
        metrics::record_queue_depth(self.queue.len());

        let estimate = dial_estimate(
            self.queue.len(),
            self.nodes.pool_connecting(),
            self.nodes.pool_size(),
            self.settings.max_outgoing_attempts,
        );
        if estimate == 0 {
            return;
        }
        tracing::debug!(estimate, queued = self.queue.len(), "Creating connections");

        if let Err(e) = self.nodes.create_connections(estimate) {
            self.dial_failures += 1;
            metrics::record_dial_failure();
            tracing::warn!(
                error = %e,
                failures = self.dial_failures,
                retry_secs = self.settings.connect_retry.as_secs(),
                "Dialing failed, backing off"
            );
            self.retry_timer = Some(
                self.scheduler
                    .oneshot(self.settings.connect_retry, TimerKind::DialRetry),
            );
        }
    }

    /// Readiness change on a queued or paired stream.
    pub fn on_stream_event(&mut self, event: StreamEvent) {
        let Some(binding) = self.nodes.binding(event.id) else {
            tracing::trace!(connection_id = %event.id, kind = ?event.kind, "Event for unbound stream");
            return;
        };
        match (binding, event.kind) {
            (Binding::Waiting, StreamEventKind::Closed) => {
                tracing::debug!(connection_id = %event.id, "Queued client left");
                self.queue.invalidate(event.id);
                self.nodes.unbind(event.id);
            }
            // Data waits in the stream until the client is paired.
            (Binding::Waiting, _) => {}
            (Binding::Session { index, side }, StreamEventKind::Readable) => {
                self.nodes.flush(index, side)
            }
            (Binding::Session { index, side }, StreamEventKind::Writable) => {
                self.nodes.flush(index, side.opposite())
            }
            (Binding::Session { index, .. }, StreamEventKind::Closed) => {
                self.nodes.close_session(index)
            }
        }
    }

    /// A dial finished.
    pub fn on_dialed(&mut self, ticket: DialTicket, stream: Option<BoxStream>) {
        if self.nodes.on_dialed(ticket, stream, self.scheduler.as_mut()) {
            self.handle_queue();
        }
    }

    /// A timer fired.
    pub fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        match kind {
            TimerKind::HealthProbe { node } => {
                if !self.nodes.on_probe(id, node) {
                    tracing::trace!(node, "Stale probe timer");
                }
            }
            TimerKind::DialRetry => {
                if self.retry_timer == Some(id) {
                    self.retry_timer = None;
                    self.handle_connections();
                }
            }
        }
    }

    /// Point-in-time view for diagnostics.
    pub fn snapshot(&self) -> BalancerSnapshot {
        BalancerSnapshot::capture(self)
    }

    /// Drop waiting clients, close every session and stop all timers.
    pub fn shutdown(&mut self) {
        for pending in self.queue.iter() {
            self.nodes.unbind(pending.id());
        }
        let dropped = self.queue.len();
        self.queue.clear();
        if let Some(timer) = self.retry_timer.take() {
            self.scheduler.cancel(timer);
        }
        let sessions = self.nodes.open_sessions();
        self.nodes.shutdown(self.scheduler.as_mut());
        tracing::info!(dropped_clients = dropped, closed_sessions = sessions, "Balancer shut down");
    }
}
