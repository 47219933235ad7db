//! Bounded FIFO buffer for requests issued while the session is not connected.

use crate::models::QueuePolicy;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct QueuedRequest<T> {
    item: T,
    enqueued_at: Instant,
    expires_at: Option<Instant>,
}

/// Offline queue with a fixed capacity, an admission policy and a TTL.
///
/// Items are opaque to the queue; the session stores the request together
/// with whatever it needs to resolve the caller.
#[derive(Debug)]
pub(crate) struct OfflineQueue<T> {
    entries: VecDeque<QueuedRequest<T>>,
    capacity: usize,
    policy: QueuePolicy,
    ttl: Option<Duration>,
}

impl<T> OfflineQueue<T> {
    /// `ttl = None` keeps entries until the next flush.
    pub fn new(capacity: usize, policy: QueuePolicy, ttl: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            policy,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit `item`.
    ///
    /// Returns `Ok(Some(evicted))` when the evict-oldest policy made room, and
    /// `Err(item)` when the item was refused (reject-newest at capacity, or a
    /// zero capacity under either policy).
    pub fn enqueue(&mut self, item: T, now: Instant) -> Result<Option<T>, T> {
        if self.capacity == 0 {
            return Err(item);
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            match self.policy {
                QueuePolicy::RejectNewest => return Err(item),
                QueuePolicy::EvictOldest => {
                    evicted = self.entries.pop_front().map(|e| e.item);
                },
            }
        }

        self.entries.push_back(QueuedRequest {
            item,
            enqueued_at: now,
            expires_at: self.ttl.map(|ttl| now + ttl),
        });
        Ok(evicted)
    }

    /// Empty the queue in FIFO order, splitting live entries from expired ones.
    pub fn take_all(&mut self, now: Instant) -> (Vec<T>, Vec<T>) {
        let mut ready = Vec::with_capacity(self.entries.len());
        let mut expired = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.expires_at.map_or(false, |at| at <= now) {
                expired.push(entry.item);
            } else {
                ready.push(entry.item);
            }
        }
        (ready, expired)
    }

    /// Remove entries whose TTL elapsed, keeping the others in place.
    pub fn expire(&mut self, now: Instant) -> Vec<T> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.expires_at.map_or(false, |at| at <= now) {
                expired.push(entry.item);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        expired
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|e| e.expires_at).min()
    }

    /// Time the oldest entry has been waiting.
    pub fn oldest_age(&self, now: Instant) -> Option<Duration> {
        self.entries
            .front()
            .map(|e| now.saturating_duration_since(e.enqueued_at))
    }

    pub fn clear(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|e| e.item).collect()
    }
}
