use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Unbounded FIFO shared between producers and the engine worker.
///
/// `pop` blocks until an item is available; there is no timeout.
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends `item` and wakes one waiting consumer.
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Removes and returns everything still queued.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), 1);
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(FrameQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || (0..3).map(|_| queue.pop()).collect::<Vec<u32>>())
        };
        for i in 0..3 {
            thread::sleep(std::time::Duration::from_millis(5));
            queue.push(i);
        }
        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = FrameQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.drain(), vec!["a", "b"]);
        assert!(queue.is_empty());
        queue.push("c");
        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
