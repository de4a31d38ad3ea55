//! Serializable view of balancer state for diagnostics.

use serde::{Deserialize, Serialize};

use crate::load_balancer::balancer::Balancer;
use crate::load_balancer::session::Session;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalancerSnapshot {
    pub queue: Vec<PendingSnapshot>,
    pub dial_failures: u64,
    pub active_check: bool,
    pub nodes: Vec<NodeSnapshot>,
    pub sessions: SessionsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSnapshot {
    pub id: u64,
    pub remote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    pub index: usize,
    pub name: String,
    pub address: String,
    pub active: bool,
    pub connecting: usize,
    pub idle: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub index: usize,
    pub client: u64,
    pub client_remote: Option<String>,
    pub backend: Option<u64>,
    pub backend_remote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsSnapshot {
    /// One entry per arena slot; `None` for reclaimed slots.
    pub slots: Vec<Option<SessionSnapshot>>,
    pub free: Vec<usize>,
    pub open: usize,
    pub total: u64,
}

impl SessionSnapshot {
    fn of(session: &Session) -> Option<Self> {
        let client = session.client()?;
        Some(Self {
            index: session.index(),
            client: client.id().as_u64(),
            client_remote: client.remote().map(|addr| addr.to_string()),
            backend: session.backend().map(|b| b.id().as_u64()),
            backend_remote: session
                .backend()
                .and_then(|b| b.remote())
                .map(|addr| addr.to_string()),
        })
    }
}

impl BalancerSnapshot {
    pub fn capture(balancer: &Balancer) -> Self {
        let pool = balancer.nodes();
        let queue = balancer
            .queue()
            .iter()
            .map(|pending| PendingSnapshot {
                id: pending.id().as_u64(),
                remote: pending
                    .stream()
                    .and_then(|s| s.remote())
                    .map(|addr| addr.to_string()),
            })
            .collect();
        let nodes = pool
            .nodes()
            .iter()
            .map(|node| NodeSnapshot {
                index: node.index(),
                name: node.name().to_string(),
                address: node.address().to_string(),
                active: node.is_active(),
                connecting: node.connection_attempts(),
                idle: node.pool_size(),
            })
            .collect();
        let table = pool.sessions();
        let sessions = SessionsSnapshot {
            slots: table.slots().iter().map(SessionSnapshot::of).collect(),
            free: table.free_slots().to_vec(),
            open: pool.open_sessions(),
            total: pool.total_sessions(),
        };

        Self {
            queue,
            dial_failures: balancer.dial_failures(),
            active_check: pool.active_check(),
            nodes,
            sessions,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
