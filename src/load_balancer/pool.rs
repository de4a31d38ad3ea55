//! Node pool management.
//!
//! # Responsibilities
//! - Own the ordered node list; indices are stable and double as cursor positions
//! - Choose dial targets round robin among active nodes
//! - Assign clients to idle connections round robin
//! - Own the session arena and the stream binding table

use std::collections::HashMap;

use crate::load_balancer::{
    error::DialError,
    node::{DialTicket, Node, NodeSettings},
    round_robin::RoundRobin,
    session::{Session, SessionTable, Side},
};
use crate::net::connection::ConnectionId;
use crate::net::dialer::Dialer;
use crate::net::stream::BoxStream;
use crate::observability::metrics;
use crate::runtime::timer::{Scheduler, TimerId};

/// Who is notified about a stream's readiness events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A client waiting in the admission queue.
    Waiting,
    /// One side of a live session.
    Session { index: usize, side: Side },
}

/// Observer called with `(index, open, total)` after a session is reclaimed.
pub type SessionCloseHook = Box<dyn FnMut(usize, usize, u64)>;

/// Backend nodes plus the sessions built on their connections.
pub struct NodePool {
    nodes: Vec<Node>,
    settings: NodeSettings,
    dial_cursor: RoundRobin,
    assign_cursor: RoundRobin,
    sessions: SessionTable,
    bindings: HashMap<ConnectionId, Binding>,
    session_cnt: usize,
    session_total: u64,
    on_session_close: Option<SessionCloseHook>,
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("nodes", &self.nodes)
            .field("open_sessions", &self.session_cnt)
            .field("total_sessions", &self.session_total)
            .finish()
    }
}

impl NodePool {
    pub fn new(settings: NodeSettings) -> Self {
        Self {
            nodes: Vec::new(),
            settings,
            dial_cursor: RoundRobin::new(),
            assign_cursor: RoundRobin::new(),
            sessions: SessionTable::new(),
            bindings: HashMap::new(),
            session_cnt: 0,
            session_total: 0,
            on_session_close: None,
        }
    }

    /// Append a node. Its index is its position and never changes.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        dialer: Box<dyn Dialer>,
        scheduler: &mut dyn Scheduler,
    ) -> usize {
        let index = self.nodes.len();
        let node = Node::new(index, name, dialer, self.settings, scheduler);
        tracing::info!(node = index, name = node.name(), address = %node.address(), "Node added");
        self.nodes.push(node);
        index
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn active_check(&self) -> bool {
        self.settings.active_check
    }

    pub fn open_sessions(&self) -> usize {
        self.session_cnt
    }

    pub fn total_sessions(&self) -> u64 {
        self.session_total
    }

    /// Dials in flight across all nodes.
    pub fn pool_connecting(&self) -> usize {
        self.nodes.iter().map(Node::connection_attempts).sum()
    }

    /// Idle connections across all nodes.
    pub fn pool_size(&self) -> usize {
        self.nodes.iter().map(Node::pool_size).sum()
    }

    pub fn set_on_session_close(&mut self, hook: impl FnMut(usize, usize, u64) + 'static) {
        self.on_session_close = Some(Box::new(hook));
    }

    /// Issue up to `total` dials, each to the next active node.
    ///
    /// When no node is active, health checking decides: with checks enabled
    /// the remaining dials are skipped until a probe succeeds; without them
    /// the next node in rotation is dialed regardless.
    pub fn create_connections(&mut self, total: usize) -> Result<(), DialError> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let len = self.nodes.len();
        for issued in 0..total {
            let nodes = &self.nodes;
            let target = match self.dial_cursor.next_matching(len, |i| nodes[i].is_active()) {
                Some(index) => index,
                None if self.settings.active_check => {
                    tracing::debug!(issued, wanted = total, "No active node, waiting for health checks");
                    return Ok(());
                }
                None => self.dial_cursor.advance(len),
            };
            self.nodes[target].connect()?;
        }
        Ok(())
    }

    /// Pair `conn` with an idle backend connection.
    ///
    /// Returns `None` on success. On failure the client stream comes back
    /// unchanged so the caller can keep it queued.
    pub fn assign(&mut self, conn: BoxStream) -> Option<BoxStream> {
        let len = self.nodes.len();
        for _ in 0..len {
            let index = self.assign_cursor.advance(len);
            if let Some(backend) = self.nodes[index].get_connection() {
                let session = self.create_session(conn, backend);
                tracing::debug!(session, node = index, "Client assigned");
                return None;
            }
        }
        Some(conn)
    }

    fn create_session(&mut self, client: BoxStream, backend: BoxStream) -> usize {
        let (client_id, backend_id) = (client.id(), backend.id());
        let index = self.sessions.insert(client, backend);
        self.bindings.insert(client_id, Binding::Session { index, side: Side::Client });
        self.bindings.insert(backend_id, Binding::Session { index, side: Side::Backend });
        self.session_total += 1;
        self.session_cnt += 1;
        tracing::debug!(
            session = index,
            open = self.session_cnt,
            total = self.session_total,
            "New session"
        );
        metrics::record_session_opened(self.session_cnt);

        // Anything either side sent before the pairing is already buffered.
        let session = self.sessions.get_mut(index);
        session.flush(Side::Client);
        session.flush(Side::Backend);
        index
    }

    pub fn session(&self, index: usize) -> &Session {
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Forward buffered data of one side of a session.
    pub fn flush(&mut self, index: usize, from: Side) {
        self.sessions.get_mut(index).flush(from);
    }

    /// Tear a live session down.
    ///
    /// # Panics
    /// When the session is not alive.
    pub fn close_session(&mut self, index: usize) {
        let session = self.sessions.get(index);
        let ids: Vec<ConnectionId> = session
            .client()
            .into_iter()
            .chain(session.backend())
            .map(|s| s.id())
            .collect();
        for id in ids {
            self.bindings.remove(&id);
        }
        self.sessions.mark_closed(index);
        self.sessions.destroy_sessions();

        self.session_cnt -= 1;
        tracing::debug!(session = index, open = self.session_cnt, "Session closed");
        metrics::record_session_closed(self.session_cnt);
        if let Some(hook) = self.on_session_close.as_mut() {
            hook(index, self.session_cnt, self.session_total);
        }
    }

    pub fn close_all_sessions(&mut self) {
        let alive: Vec<usize> = self.sessions.alive().map(Session::index).collect();
        for index in alive {
            self.close_session(index);
        }
    }

    /// Deliver a dial outcome to its node. Returns true when idle capacity grew.
    pub fn on_dialed(
        &mut self,
        ticket: DialTicket,
        stream: Option<BoxStream>,
        scheduler: &mut dyn Scheduler,
    ) -> bool {
        match self.nodes.get_mut(ticket.node) {
            Some(node) => node.complete_dial(ticket.attempt, stream, scheduler),
            None => {
                tracing::warn!(node = ticket.node, "Dial completion for unknown node");
                if let Some(mut stream) = stream {
                    stream.abort();
                }
                false
            }
        }
    }

    /// Probe timer fired for `node`. Returns false for a stale timer.
    pub fn on_probe(&mut self, id: TimerId, node: usize) -> bool {
        match self.nodes.get_mut(node) {
            Some(node) if node.owns_timer(id) => {
                node.perform_active_check();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn binding(&self, id: ConnectionId) -> Option<Binding> {
        self.bindings.get(&id).copied()
    }

    pub(crate) fn bind(&mut self, id: ConnectionId, binding: Binding) {
        self.bindings.insert(id, binding);
    }

    pub(crate) fn unbind(&mut self, id: ConnectionId) {
        self.bindings.remove(&id);
    }

    pub(crate) fn bound(&self) -> usize {
        self.bindings.len()
    }

    /// Close every session, stop probing and drop pooled connections.
    pub fn shutdown(&mut self, scheduler: &mut dyn Scheduler) {
        self.close_all_sessions();
        for node in &mut self.nodes {
            node.shutdown(scheduler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::ProbeSchedule;
    use crate::testing::{mock_stream, DialLog, ManualScheduler, MockHandle};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn pool(nodes: usize, active_check: bool) -> (NodePool, ManualScheduler, DialLog) {
        let mut scheduler = ManualScheduler::new();
        let dials = DialLog::new();
        let mut pool = NodePool::new(NodeSettings {
            active_check,
            probe: ProbeSchedule {
                initial_delay: Duration::from_secs(8),
                interval: Duration::from_secs(30),
            },
            connect_timeout: Duration::from_secs(10),
        });
        for i in 0..nodes {
            pool.add_node(format!("node{}", i), dials.dialer(9000 + i as u16), &mut scheduler);
        }
        (pool, scheduler, dials)
    }

    /// Dial every node once and complete the dials successfully.
    fn fill(pool: &mut NodePool, scheduler: &mut ManualScheduler) -> Vec<MockHandle> {
        let mut handles = Vec::new();
        for index in 0..pool.len() {
            let ticket = pool.nodes[index].connect().unwrap();
            let (stream, handle) = mock_stream();
            assert!(pool.on_dialed(ticket, Some(stream), scheduler));
            handles.push(handle);
        }
        handles
    }

    #[test]
    fn blind_round_robin_without_health_checks() {
        let (mut pool, _scheduler, dials) = pool(3, false);

        pool.create_connections(4).unwrap();
        let nodes: Vec<usize> = dials.attempts().iter().map(|t| t.node).collect();
        assert_eq!(nodes, vec![0, 1, 2, 0]);
        assert_eq!(pool.pool_connecting(), 4);
    }

    #[test]
    fn health_checked_pool_waits_when_no_node_is_active() {
        let (mut pool, _scheduler, dials) = pool(3, true);

        pool.create_connections(5).unwrap();
        assert!(dials.attempts().is_empty());
        assert_eq!(pool.pool_connecting(), 0);
    }

    #[test]
    fn dials_prefer_active_nodes() {
        let (mut pool, mut scheduler, dials) = pool(3, true);
        let ticket = pool.nodes[1].connect().unwrap();
        let (stream, _) = mock_stream();
        pool.on_dialed(ticket, Some(stream), &mut scheduler);
        dials.take_attempts();

        pool.create_connections(3).unwrap();
        let nodes: Vec<usize> = dials.attempts().iter().map(|t| t.node).collect();
        assert_eq!(nodes, vec![1, 1, 1]);
    }

    #[test]
    fn dial_error_aborts_remaining_attempts() {
        let (mut pool, _scheduler, dials) = pool(2, false);
        dials.set_exhausted(true);

        assert!(pool.create_connections(3).is_err());
        assert_eq!(pool.pool_connecting(), 0);
    }

    #[test]
    fn assignment_rotates_across_nodes() {
        let (mut pool, mut scheduler, _dials) = pool(3, false);
        let backends = fill(&mut pool, &mut scheduler);
        assert_eq!(pool.pool_size(), 3);

        let mut used = Vec::new();
        for _ in 0..3 {
            let (client, _) = mock_stream();
            assert!(pool.assign(client).is_none());
        }
        for session in pool.sessions().alive() {
            let backend = session.backend().unwrap().id();
            used.push(backends.iter().position(|h| h.id == backend).unwrap());
        }
        used.sort();
        assert_eq!(used, vec![0, 1, 2]);
        assert_eq!(pool.open_sessions(), 3);
        assert_eq!(pool.total_sessions(), 3);
    }

    #[test]
    fn assignment_without_capacity_returns_client() {
        let (mut pool, _scheduler, _dials) = pool(2, false);
        let (client, handle) = mock_stream();

        let returned = pool.assign(client).expect("no capacity");
        assert_eq!(returned.id(), handle.id);
        assert_eq!(pool.open_sessions(), 0);
    }

    #[test]
    fn session_creation_flushes_early_bytes() {
        let (mut pool, mut scheduler, _dials) = pool(1, false);
        let backends = fill(&mut pool, &mut scheduler);
        backends[0].push(b"220 ready\r\n");
        let (client, c) = mock_stream();
        c.push(b"EHLO\r\n");

        assert!(pool.assign(client).is_none());
        assert_eq!(backends[0].written(), b"EHLO\r\n");
        assert_eq!(c.written(), b"220 ready\r\n");
    }

    #[test]
    fn close_session_unbinds_and_reports() {
        let (mut pool, mut scheduler, _dials) = pool(2, false);
        fill(&mut pool, &mut scheduler);
        let closed = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&closed);
        pool.set_on_session_close(move |index, open, total| seen.borrow_mut().push((index, open, total)));

        let (a, ha) = mock_stream();
        let (b, _hb) = mock_stream();
        pool.assign(a);
        pool.assign(b);
        assert_eq!(pool.bound(), 4);
        assert_eq!(pool.binding(ha.id), Some(Binding::Session { index: 0, side: Side::Client }));

        pool.close_session(0);
        assert_eq!(pool.bound(), 2);
        assert_eq!(pool.binding(ha.id), None);
        assert!(ha.closed());
        assert_eq!(*closed.borrow(), vec![(0, 1, 2)]);

        // The freed slot is the next one used.
        fill(&mut pool, &mut scheduler);
        let (c, _) = mock_stream();
        pool.assign(c);
        assert_eq!(pool.sessions().capacity(), 2);
        assert!(pool.session(0).is_alive());
    }

    #[test]
    fn backend_with_unsent_bytes_lingers() {
        let (mut pool, mut scheduler, _dials) = pool(1, false);
        let backends = fill(&mut pool, &mut scheduler);
        backends[0].set_unsent(true);
        let (client, c) = mock_stream();
        pool.assign(client);

        pool.close_session(0);
        assert!(c.closed());
        assert!(!backends[0].aborted());
        assert!(!backends[0].closed());
        assert!(backends[0].dropped());
    }

    #[test]
    fn stale_probe_timer_is_ignored() {
        let (mut pool, mut scheduler, dials) = pool(1, true);
        let timers = scheduler.log();
        let probe = timers.active()[0].id;

        assert!(pool.on_probe(probe, 0));
        let ticket = dials.attempts()[0];
        let (stream, _) = mock_stream();
        pool.on_dialed(ticket, Some(stream), &mut scheduler);

        // Cancelled, but an expiry may already be queued.
        assert!(!pool.on_probe(probe, 0));
        assert_eq!(dials.attempts().len(), 1);
    }

    #[test]
    fn shutdown_closes_everything() {
        let (mut pool, mut scheduler, _dials) = pool(2, true);
        let backends = fill(&mut pool, &mut scheduler);
        let (client, c) = mock_stream();
        pool.assign(client);

        pool.shutdown(&mut scheduler);
        assert_eq!(pool.open_sessions(), 0);
        assert_eq!(pool.pool_size(), 0);
        assert!(c.closed());
        assert!(backends.iter().all(|b| b.aborted() || b.closed()));
        assert!(scheduler.log().active().is_empty());
    }
}
