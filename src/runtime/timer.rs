//! Timer facility.
//!
//! # Responsibilities
//! - One-shot and periodic scheduling with cancellable handles
//! - Deliver expirations to the control loop as [`Event::Timer`]
//!
//! # Design Decisions
//! - "No timer" is `Option<TimerId>::None` at the owner, never a sentinel id
//! - Cancellation is best effort: an expiry already queued may still arrive,
//!   so owners compare the fired id with the handle they currently hold
//!
//! [`Event::Timer`]: crate::runtime::event::Event::Timer

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::runtime::event::EventSender;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Periodic reachability probe for the node at this index.
    HealthProbe { node: usize },
    /// Retry of the demand-estimation step after resource exhaustion.
    DialRetry,
}

/// Scheduling capability consumed by the balancer core.
pub trait Scheduler {
    fn oneshot(&mut self, delay: Duration, kind: TimerKind) -> TimerId;

    /// Fire after `initial`, then every `period`.
    fn periodic(&mut self, initial: Duration, period: Duration, kind: TimerKind) -> TimerId;

    fn cancel(&mut self, id: TimerId);
}

/// [`Scheduler`] backed by tokio sleeps, one task per timer.
#[derive(Debug)]
pub struct TokioScheduler {
    events: EventSender,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: 1,
            tasks: HashMap::new(),
        }
    }

    /// Number of timers whose task is still alive.
    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }

    fn allocate(&mut self) -> TimerId {
        // Fired one-shots leave finished handles behind.
        self.tasks.retain(|_, task| !task.is_finished());
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Scheduler for TokioScheduler {
    fn oneshot(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        let id = self.allocate();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            events.timer(id, kind);
        });
        self.tasks.insert(id, task);
        id
    }

    fn periodic(&mut self, initial: Duration, period: Duration, kind: TimerKind) -> TimerId {
        let id = self.allocate();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + initial, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.is_closed() {
                    break;
                }
                events.timer(id, kind);
            }
        });
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
