//! Buffers for server-originated messages.
//!
//! Notices and notifications are moved out of the native session while the
//! guard is held and appended here only after it has been released, so
//! observers are free to call back into the connection.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::native::Notification;

/// Receives every notice after it has been buffered.
pub trait NoticeObserver: Send + Sync {
    fn on_notice(&self, notice: &str);
}

impl<F> NoticeObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_notice(&self, notice: &str) {
        self(notice);
    }
}

/// Messages taken from the native session during one locked section.
#[derive(Debug, Default)]
pub struct Drained {
    pub notices: Vec<String>,
    pub notifications: Vec<Notification>,
}

impl Drained {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty() && self.notifications.is_empty()
    }

    /// Append another batch, keeping arrival order.
    pub fn extend(&mut self, other: Self) {
        self.notices.extend(other.notices);
        self.notifications.extend(other.notifications);
    }
}

/// Ordered queue keeping at most `capacity` entries, dropping the oldest.
#[derive(Debug, Clone)]
pub struct Bounded<T> {
    items: VecDeque<T>,
    capacity: NonZeroUsize,
}

impl<T> Bounded<T> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Push `item`, returning how many old entries were discarded.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        let mut dropped = 0;
        while self.items.len() > self.capacity.get() {
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Pending notices and notifications of one connection.
pub struct MessageQueues {
    pub notices: Bounded<String>,
    pub notifies: Bounded<Notification>,
    observers: Vec<Arc<dyn NoticeObserver>>,
}

impl fmt::Debug for MessageQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueues")
            .field("notices", &self.notices.len())
            .field("notifies", &self.notifies.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl MessageQueues {
    #[must_use]
    pub fn new(notice_capacity: NonZeroUsize, notify_capacity: NonZeroUsize) -> Self {
        Self {
            notices: Bounded::new(notice_capacity),
            notifies: Bounded::new(notify_capacity),
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn NoticeObserver>) {
        self.observers.push(observer);
    }

    /// Buffer a drained batch and return the observers that must see its notices.
    pub fn absorb(&mut self, drained: &Drained) -> Vec<Arc<dyn NoticeObserver>> {
        let mut dropped = 0;
        for notice in &drained.notices {
            dropped += self.notices.push(notice.clone());
        }
        for notification in &drained.notifications {
            dropped += self.notifies.push(notification.clone());
        }
        if dropped > 0 {
            tracing::debug!(dropped, "message buffer full, discarded oldest entries");
        }
        if drained.notices.is_empty() {
            Vec::new()
        } else {
            self.observers.clone()
        }
    }

    pub fn clear(&mut self) {
        self.notices.clear();
        self.notifies.clear();
    }
}
