//! Test doubles for the stream, dialer and timer capabilities.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;

use crate::load_balancer::error::DialError;
use crate::load_balancer::node::DialTicket;
use crate::net::connection::ConnectionId;
use crate::net::dialer::Dialer;
use crate::net::stream::{BoxStream, Stream};
use crate::runtime::timer::{Scheduler, TimerId, TimerKind};

#[derive(Debug)]
pub struct MockState {
    pub inbound: VecDeque<Bytes>,
    pub written: Vec<Bytes>,
    pub connected: bool,
    pub writable: bool,
    pub unsent: bool,
    pub closed: bool,
    pub aborted: bool,
    pub dropped: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            connected: true,
            writable: true,
            unsent: false,
            closed: false,
            aborted: false,
            dropped: false,
        }
    }
}

/// In-memory stream whose state stays observable after it is handed over.
pub struct MockStream {
    id: ConnectionId,
    state: Rc<RefCell<MockState>>,
}

/// Test-side view of a [`MockStream`].
#[derive(Clone)]
pub struct MockHandle {
    pub id: ConnectionId,
    state: Rc<RefCell<MockState>>,
}

pub fn mock_stream() -> (BoxStream, MockHandle) {
    let id = ConnectionId::new();
    let state = Rc::new(RefCell::new(MockState::default()));
    let handle = MockHandle {
        id,
        state: Rc::clone(&state),
    };
    (Box::new(MockStream { id, state }), handle)
}

impl MockHandle {
    pub fn push(&self, data: &'static [u8]) {
        self.state.borrow_mut().inbound.push_back(Bytes::from_static(data));
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn buffered(&self) -> usize {
        self.state.borrow().inbound.len()
    }

    pub fn set_writable(&self, writable: bool) {
        self.state.borrow_mut().writable = writable;
    }

    pub fn set_unsent(&self, unsent: bool) {
        self.state.borrow_mut().unsent = unsent;
    }

    pub fn disconnect(&self) {
        self.state.borrow_mut().connected = false;
    }

    pub fn closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn aborted(&self) -> bool {
        self.state.borrow().aborted
    }

    pub fn dropped(&self) -> bool {
        self.state.borrow().dropped
    }
}

impl Stream for MockStream {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> Option<SocketAddr> {
        None
    }

    fn write(&mut self, chunk: Bytes) {
        self.state.borrow_mut().written.push(chunk);
    }

    fn read_next(&mut self) -> Option<Bytes> {
        self.state.borrow_mut().inbound.pop_front()
    }

    fn next_size(&mut self) -> usize {
        self.state.borrow().inbound.front().map_or(0, Bytes::len)
    }

    fn is_writable(&self) -> bool {
        let state = self.state.borrow();
        state.writable && state.connected
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn has_unsent_data(&self) -> bool {
        self.state.borrow().unsent
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        state.connected = false;
    }

    fn abort(&mut self) {
        let mut state = self.state.borrow_mut();
        state.aborted = true;
        state.connected = false;
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.state.borrow_mut().dropped = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub initial: Duration,
    pub period: Option<Duration>,
}

#[derive(Debug, Default)]
struct TimerState {
    next_id: u64,
    active: Vec<ScheduledTimer>,
    cancelled: Vec<TimerId>,
}

/// Records timers instead of running them; tests fire them by hand.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<TimerState>>,
}

/// Test-side view of a [`ManualScheduler`].
#[derive(Debug, Clone)]
pub struct TimerLog {
    state: Rc<RefCell<TimerState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> TimerLog {
        TimerLog {
            state: Rc::clone(&self.state),
        }
    }

    fn schedule(&mut self, kind: TimerKind, initial: Duration, period: Option<Duration>) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TimerId::new(state.next_id);
        state.active.push(ScheduledTimer { id, kind, initial, period });
        id
    }
}

impl Scheduler for ManualScheduler {
    fn oneshot(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.schedule(kind, delay, None)
    }

    fn periodic(&mut self, initial: Duration, period: Duration, kind: TimerKind) -> TimerId {
        self.schedule(kind, initial, Some(period))
    }

    fn cancel(&mut self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        state.active.retain(|t| t.id != id);
        state.cancelled.push(id);
    }
}

impl TimerLog {
    pub fn active(&self) -> Vec<ScheduledTimer> {
        self.state.borrow().active.clone()
    }

    pub fn active_of(&self, kind: TimerKind) -> Vec<ScheduledTimer> {
        self.active().into_iter().filter(|t| t.kind == kind).collect()
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.state.borrow().cancelled.clone()
    }

    /// Expire a timer: one-shots are consumed, periodic timers stay.
    pub fn fire(&self, id: TimerId) -> TimerKind {
        let mut state = self.state.borrow_mut();
        let pos = state
            .active
            .iter()
            .position(|t| t.id == id)
            .unwrap_or_else(|| panic!("timer {:?} is not active", id));
        let timer = state.active[pos];
        if timer.period.is_none() {
            state.active.remove(pos);
        }
        timer.kind
    }
}

#[derive(Debug, Default)]
struct DialState {
    attempts: Vec<DialTicket>,
    exhausted: bool,
}

/// Records dial tickets; completions are delivered by the test.
#[derive(Debug)]
pub struct MockDialer {
    address: SocketAddr,
    state: Rc<RefCell<DialState>>,
}

/// Test-side view shared by every [`MockDialer`] it creates.
#[derive(Debug, Clone, Default)]
pub struct DialLog {
    state: Rc<RefCell<DialState>>,
}

impl DialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialer(&self, port: u16) -> Box<dyn Dialer> {
        Box::new(MockDialer {
            address: SocketAddr::from(([127, 0, 0, 1], port)),
            state: Rc::clone(&self.state),
        })
    }

    pub fn attempts(&self) -> Vec<DialTicket> {
        self.state.borrow().attempts.clone()
    }

    pub fn take_attempts(&self) -> Vec<DialTicket> {
        std::mem::take(&mut self.state.borrow_mut().attempts)
    }

    /// Oldest outstanding attempt, removed from the log.
    pub fn pop_attempt(&self) -> Option<DialTicket> {
        let mut state = self.state.borrow_mut();
        if state.attempts.is_empty() {
            None
        } else {
            Some(state.attempts.remove(0))
        }
    }

    /// Make every following dial fail synchronously.
    pub fn set_exhausted(&self, exhausted: bool) {
        self.state.borrow_mut().exhausted = exhausted;
    }
}

impl Dialer for MockDialer {
    fn address(&self) -> SocketAddr {
        self.address
    }

    fn dial(&mut self, _timeout: Duration, ticket: DialTicket) -> Result<(), DialError> {
        let mut state = self.state.borrow_mut();
        if state.exhausted {
            return Err(DialError::ResourceExhausted {
                address: self.address,
                source: io::Error::new(io::ErrorKind::AddrNotAvailable, "ephemeral ports exhausted"),
            });
        }
        state.attempts.push(ticket);
        Ok(())
    }
}

/// A loopback listener whose accept backlog is full, so further
/// connection attempts to it are never answered.
#[derive(Debug)]
pub struct SaturatedListener {
    pub address: SocketAddr,
    _listener: tokio::net::TcpListener,
    _queued: Vec<tokio::net::TcpStream>,
}

pub async fn saturated_listener() -> SaturatedListener {
    let socket = tokio::net::TcpSocket::new_v4().unwrap();
    socket.bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let address = socket.local_addr().unwrap();
    let listener = socket.listen(1).unwrap();

    // Never accepted: fill the backlog until a handshake stalls.
    let mut queued = Vec::new();
    for _ in 0..16 {
        let attempt = tokio::net::TcpStream::connect(address);
        match tokio::time::timeout(Duration::from_millis(200), attempt).await {
            Ok(Ok(stream)) => queued.push(stream),
            _ => break,
        }
    }
    SaturatedListener {
        address,
        _listener: listener,
        _queued: queued,
    }
}
