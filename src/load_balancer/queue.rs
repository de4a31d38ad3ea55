//! Admission queue of clients not yet paired with a backend.

use std::collections::VecDeque;
use std::time::Instant;

use crate::net::connection::ConnectionId;
use crate::net::stream::BoxStream;

/// One accepted client waiting for capacity.
pub struct PendingClient {
    id: ConnectionId,
    conn: Option<BoxStream>,
    queued_at: Instant,
}

impl std::fmt::Debug for PendingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingClient")
            .field("id", &self.id)
            .field("held", &self.conn.is_some())
            .finish()
    }
}

impl PendingClient {
    pub fn new(conn: BoxStream) -> Self {
        Self {
            id: conn.id(),
            conn: Some(conn),
            queued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn stream(&self) -> Option<&BoxStream> {
        self.conn.as_ref()
    }

    /// Still holding a connected stream.
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.is_connected())
    }

    /// Time spent in the queue so far.
    pub fn waited(&self) -> std::time::Duration {
        self.queued_at.elapsed()
    }

    fn take(&mut self) -> Option<BoxStream> {
        self.conn.take()
    }

    fn restore(&mut self, conn: BoxStream) {
        debug_assert_eq!(conn.id(), self.id);
        self.conn = Some(conn);
    }
}

/// FIFO of pending clients.
#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<PendingClient>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push_back(&mut self, conn: BoxStream) {
        self.entries.push_back(PendingClient::new(conn));
    }

    pub fn front(&self) -> Option<&PendingClient> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<PendingClient> {
        self.entries.pop_front()
    }

    /// Take the front client's stream for an assignment attempt; the entry
    /// stays in place. `None` when the front client is gone.
    pub fn take_front(&mut self) -> Option<BoxStream> {
        let front = self.entries.front_mut()?;
        if front.is_connected() {
            front.take()
        } else {
            None
        }
    }

    /// Put a stream back into the front entry after a failed attempt.
    pub fn restore_front(&mut self, conn: BoxStream) {
        match self.entries.front_mut() {
            Some(front) => front.restore(conn),
            None => self.entries.push_front(PendingClient::new(conn)),
        }
    }

    /// Drop the stream of the client with `id`: it closed while waiting.
    pub fn invalidate(&mut self, id: ConnectionId) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.conn = None;
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose stream is gone. Returns their ids.
    pub fn prune(&mut self) -> Vec<ConnectionId> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let keep = entry.is_connected();
            if !keep {
                removed.push(entry.id);
            }
            keep
        });
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingClient> {
        self.entries.iter()
    }
}
