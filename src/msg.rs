//! Message queues shared between blocks.
//!
//! A message is a [`Tag`] whose offset carries no stream meaning. Each block
//! owns one input [`MsgQueue`]; its message output groups fan out to every
//! queue subscribed to them.

use crate::tag::Tag;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to a FIFO of messages.
#[derive(Debug, Clone, Default)]
pub struct MsgQueue {
    inner: Arc<Mutex<VecDeque<Tag>>>,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Tag>> {
        // A producer that panicked mid-push leaves the deque itself intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a message.
    pub fn post(&self, msg: Tag) {
        self.lock().push_back(msg);
    }

    /// True when at least one message is waiting. Never blocks on an empty queue.
    pub fn check(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Remove and return the oldest message.
    pub fn pop(&self) -> Option<Tag> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True when both handles refer to the same queue.
    pub fn same_queue(&self, other: &MsgQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Message output groups of one block.
#[derive(Debug, Clone, Default)]
pub struct MsgOutputs {
    groups: Vec<Vec<MsgQueue>>,
}

impl MsgOutputs {
    /// Create `count` groups with no subscribers.
    pub fn new(count: usize) -> Self {
        Self {
            groups: vec![Vec::new(); count],
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Subscribe `queue` to `group`. Returns false if the group does not exist.
    pub fn subscribe(&mut self, group: usize, queue: MsgQueue) -> bool {
        match self.groups.get_mut(group) {
            Some(subscribers) => {
                subscribers.push(queue);
                true
            }
            None => false,
        }
    }

    /// Deliver `msg` to every subscriber of `group`.
    ///
    /// Returns false if the group does not exist. A group without
    /// subscribers drops the message.
    pub fn post(&self, group: usize, msg: Tag) -> bool {
        let Some(subscribers) = self.groups.get(group) else {
            return false;
        };
        if let Some((last, rest)) = subscribers.split_last() {
            for queue in rest {
                queue.post(msg.clone());
            }
            last.post(msg);
        }
        true
    }
}
