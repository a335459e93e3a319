//! A bounded, drop-oldest outbound frame queue (spec §4.3: "a bounded
//! outbound queue with drop-oldest when full is acceptable for audio
//! frames").

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct DropOldestQueue {
    inner: parking_lot::Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    capacity: usize,
}

impl DropOldestQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: parking_lot::Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        })
    }

    /// Push a frame, dropping the oldest queued frame if at capacity.
    /// Returns `true` if an older frame was dropped to make room.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        let mut dropped = false;
        {
            let mut guard = self.inner.lock();
            if guard.len() >= self.capacity {
                guard.pop_front();
                dropped = true;
            }
            guard.push_back(frame);
        }
        self.notify.notify_one();
        dropped
    }

    pub fn pop(&self) -> Option<Vec<u8>> {
        self.inner.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.inner.lock().drain(..).collect()
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_within_capacity_without_dropping() {
        let q = DropOldestQueue::new(2);
        assert!(!q.push(vec![1]));
        assert!(!q.push(vec![2]));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn push_past_capacity_drops_oldest() {
        let q = DropOldestQueue::new(2);
        q.push(vec![1]);
        q.push(vec![2]);
        assert!(q.push(vec![3]));
        assert_eq!(q.drain(), vec![vec![2], vec![3]]);
    }
}
