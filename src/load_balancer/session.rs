//! Proxy sessions and the arena that stores them.
//!
//! # Responsibilities
//! - Pair one client stream with one backend stream
//! - Pump bytes in both directions, stopping when the far side is full
//! - Reclaim slots through a free list so indices stay bounded by the
//!   high-water mark of concurrent sessions
//!
//! # Design Decisions
//! - A session is alive exactly while it holds its client stream
//! - Teardown never waits for the backend: unsent backend bytes are left
//!   to the transport, which drains and closes on its own

use crate::net::stream::{BoxStream, Stream};

/// Which stream of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Client,
    Backend,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Client => Side::Backend,
            Side::Backend => Side::Client,
        }
    }
}

/// One client/backend pairing, identified by its arena index.
pub struct Session {
    index: usize,
    client: Option<BoxStream>,
    backend: Option<BoxStream>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("index", &self.index)
            .field("client", &self.client.as_ref().map(|s| s.id()))
            .field("backend", &self.backend.as_ref().map(|s| s.id()))
            .finish()
    }
}

impl Session {
    fn new(index: usize, client: BoxStream, backend: BoxStream) -> Self {
        Self {
            index,
            client: Some(client),
            backend: Some(backend),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_alive(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&dyn Stream> {
        self.client.as_deref()
    }

    pub fn backend(&self) -> Option<&dyn Stream> {
        self.backend.as_deref()
    }

    /// Move buffered data from `from` to the opposite side for as long as
    /// the opposite side accepts it. Returns the number of chunks moved.
    pub fn flush(&mut self, from: Side) -> usize {
        let (Some(client), Some(backend)) = (self.client.as_mut(), self.backend.as_mut()) else {
            return 0;
        };
        let (src, dst) = match from {
            Side::Client => (client, backend),
            Side::Backend => (backend, client),
        };

        let mut moved = 0;
        while src.next_size() > 0 && dst.is_writable() {
            let Some(chunk) = src.read_next() else {
                break;
            };
            dst.write(chunk);
            moved += 1;
        }
        if moved > 0 {
            tracing::trace!(session = self.index, from = ?from, chunks = moved, "Flushed");
        }
        moved
    }

    /// Give up both streams. The client is closed; the backend is aborted
    /// only when nothing it was asked to send is still queued.
    fn release(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close();
        }
        if let Some(mut backend) = self.backend.take() {
            if !backend.has_unsent_data() {
                backend.abort();
            } else {
                tracing::debug!(session = self.index, connection_id = %backend.id(), "Backend lingering to drain");
            }
        }
    }
}

/// Growable session store with LIFO slot reuse.
#[derive(Debug, Default)]
pub struct SessionTable {
    slots: Vec<Session>,
    free: Vec<usize>,
    closed: Vec<usize>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new session, reusing the most recently freed slot.
    pub fn insert(&mut self, client: BoxStream, backend: BoxStream) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Session::new(index, client, backend);
                index
            }
            None => {
                let index = self.slots.len();
                self.slots.push(Session::new(index, client, backend));
                index
            }
        }
    }

    /// Live session at `index`.
    ///
    /// # Panics
    /// When `index` is out of range or the session is not alive.
    pub fn get(&self, index: usize) -> &Session {
        let session = &self.slots[index];
        assert!(session.is_alive(), "session {} is not alive", index);
        session
    }

    /// See [`SessionTable::get`].
    pub fn get_mut(&mut self, index: usize) -> &mut Session {
        let session = &mut self.slots[index];
        assert!(session.is_alive(), "session {} is not alive", index);
        session
    }

    /// Queue a live session for reclamation.
    pub fn mark_closed(&mut self, index: usize) {
        let _ = self.get(index);
        self.closed.push(index);
    }

    /// Reclaim every session queued by [`SessionTable::mark_closed`].
    pub fn destroy_sessions(&mut self) {
        for index in std::mem::take(&mut self.closed) {
            self.get_mut(index).release();
            self.free.push(index);
            tracing::trace!(session = index, "Session destroyed");
        }
    }

    /// Iterate over alive sessions.
    pub fn alive(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().filter(|s| s.is_alive())
    }

    /// Slots ever allocated (the high-water mark).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reusable indices, next to be reused last.
    pub fn free_slots(&self) -> &[usize] {
        &self.free
    }

    pub fn slots(&self) -> &[Session] {
        &self.slots
    }
}
