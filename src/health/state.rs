//! Node health state machine.
//!
//! # States
//! - Inactive: not known to be good; probed periodically when checks are enabled
//! - Active: known good; serves pooled connections; no probing
//!
//! # State Transitions
//! ```text
//! construction        → Inactive, first probe after 0s, then every period
//! dial success        → Active, probe timer cancelled
//! dial failure        → Inactive, probe timer started after the initial delay
//!                       unless one is already running
//! ```
//!
//! # Design Decisions
//! - At most one probe timer per node; the handle is an `Option`
//! - No hysteresis: one dial outcome decides the state

use std::time::Duration;

use crate::runtime::timer::{Scheduler, TimerId, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Inactive,
    Active,
}

/// Probe timing for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSchedule {
    /// Delay before the first probe after a failure.
    pub initial_delay: Duration,
    /// Steady-state probe period.
    pub interval: Duration,
}

/// Health state plus the probe timer that drives recovery.
#[derive(Debug)]
pub struct HealthCheck {
    node: usize,
    enabled: bool,
    schedule: ProbeSchedule,
    state: HealthState,
    timer: Option<TimerId>,
}

impl HealthCheck {
    /// Start Inactive. With checks enabled the first probe is due immediately.
    pub fn new(node: usize, enabled: bool, schedule: ProbeSchedule, scheduler: &mut dyn Scheduler) -> Self {
        let mut check = Self {
            node,
            enabled,
            schedule,
            state: HealthState::Inactive,
            timer: None,
        };
        if enabled {
            check.timer = Some(scheduler.periodic(Duration::ZERO, schedule.interval, check.kind()));
        }
        check
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == HealthState::Active
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `id` is the probe timer currently owned by this node.
    pub fn owns_timer(&self, id: TimerId) -> bool {
        self.timer == Some(id)
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// A dial succeeded. Returns true on a state change.
    pub fn mark_active(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        let changed = self.state != HealthState::Active;
        self.state = HealthState::Active;
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        changed
    }

    /// A dial failed. Returns true on a state change.
    pub fn mark_inactive(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        let changed = self.state != HealthState::Inactive;
        self.state = HealthState::Inactive;
        if self.enabled && self.timer.is_none() {
            self.timer = Some(scheduler.periodic(
                self.schedule.initial_delay,
                self.schedule.interval,
                self.kind(),
            ));
        }
        changed
    }

    /// Stop probing for good.
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
    }

    fn kind(&self) -> TimerKind {
        TimerKind::HealthProbe { node: self.node }
    }
}
