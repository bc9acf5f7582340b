//! One-directional event queues between the owning thread and the simulation
//!
//! The sending half only pushes and can be cloned freely. The receiving half
//! only drains, taking everything queued so far in one short lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Create a connected sender/receiver pair
pub fn event_queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let inner = Arc::new(Mutex::new(VecDeque::new()));
    (
        QueueSender {
            inner: Arc::clone(&inner),
        },
        QueueReceiver { inner },
    )
}

fn lock<T>(inner: &Mutex<VecDeque<T>>) -> MutexGuard<'_, VecDeque<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pushing half of an event queue
#[derive(Debug)]
pub struct QueueSender<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) {
        lock(&self.inner).push_back(item);
    }

    /// Items waiting to be drained
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Draining half of an event queue
#[derive(Debug)]
pub struct QueueReceiver<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> QueueReceiver<T> {
    /// Take every queued item in FIFO order
    pub fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut *lock(&self.inner))
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}
