//! Guard against late responses for a page the reader already left

/// Issued when a request is dispatched; carries the key it was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    generation: u64,
}

/// Tracks the most recent request per channel. Only a response whose ticket
/// is still the latest may be applied.
#[derive(Debug, Clone)]
pub struct LatestRequest<K> {
    generation: u64,
    latest: Option<Ticket<K>>,
}

impl<K> Default for LatestRequest<K> {
    fn default() -> Self {
        Self {
            generation: 0,
            latest: None,
        }
    }
}

impl<K: Clone + PartialEq> LatestRequest<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, key: K) -> Ticket<K> {
        self.generation += 1;
        let ticket = Ticket {
            key,
            generation: self.generation,
        };
        self.latest = Some(ticket.clone());
        ticket
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        self.latest.as_ref() == Some(ticket)
    }

    /// Consume the pending request if `ticket` is the latest one.
    pub fn complete(&mut self, ticket: &Ticket<K>) -> bool {
        if self.is_current(ticket) {
            self.latest = None;
            true
        } else {
            false
        }
    }

    /// Drop any pending request, e.g. on navigation.
    pub fn invalidate(&mut self) {
        self.latest = None;
    }

    pub fn is_pending(&self) -> bool {
        self.latest.is_some()
    }
}
