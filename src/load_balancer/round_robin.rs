//! Round-robin cursor.

/// Rotating position over a fixed-size node list.
///
/// The cursor persists across calls so successive scans start where the
/// previous one stopped. Every inspected position advances it, matched
/// or not.
#[derive(Debug, Default, Clone)]
pub struct RoundRobin {
    counter: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.counter
    }

    /// Return the current position and move past it.
    pub fn advance(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        let index = self.counter % len;
        self.counter = (index + 1) % len;
        index
    }

    /// Scan at most one full rotation for the first position accepted by
    /// `pred`. Returns `None` after a full rotation without a match.
    pub fn next_matching<F>(&mut self, len: usize, mut pred: F) -> Option<usize>
    where
        F: FnMut(usize) -> bool,
    {
        for _ in 0..len {
            let index = self.advance(len);
            if pred(index) {
                return Some(index);
            }
        }
        None
    }
}
