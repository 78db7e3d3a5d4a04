use crate::raytracer::ray::Ray;
use crate::raytracer::renderer::Continuation;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Debug, PartialEq)]
pub enum WorkItem {
    Origin { ray: Ray, x: u32, y: u32 },
    Continuation(Continuation),
}

impl WorkItem {
    #[cfg(test)]
    pub fn pixel(&self) -> (u32, u32) {
        match self {
            WorkItem::Origin { x, y, .. } => (*x, *y),
            WorkItem::Continuation(c) => (c.x, c.y),
        }
    }
}

struct QueueState {
    items: VecDeque<WorkItem>,
    finished: bool,
}

/// FIFO of pending rays local to one worker process.
///
/// The control thread pushes, the render thread pops. `finish` records that
/// the scheduler will send nothing more; after that an empty queue means the
/// render thread is done.
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                finished: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push_origin(&self, ray: Ray, x: u32, y: u32) {
        self.push(WorkItem::Origin { ray, x, y });
    }

    pub fn push_continuation(&self, continuation: Continuation) {
        self.push(WorkItem::Continuation(continuation));
    }

    fn push(&self, item: WorkItem) {
        self.state.lock().items.push_back(item);
        self.available.notify_one();
    }

    pub fn pop_front(&self) -> Option<WorkItem> {
        self.state.lock().items.pop_front()
    }

    /// Blocks until an item is available. Returns `None` only once the queue
    /// is both empty and finished.
    pub fn next_blocking(&self) -> Option<WorkItem> {
        loop {
            if let Some(item) = self.pop_front() {
                return Some(item);
            }
            let mut state = self.state.lock();
            // Re-checked under the lock so a push between the two cannot be missed.
            if !state.items.is_empty() {
                continue;
            }
            if state.finished {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn finish(&self) {
        self.state.lock().finished = true;
        self.available.notify_all();
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raytracer::renderer::ResumeToken;
    use glam::Vec3;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_mixed_items_pop_in_push_order() {
        let queue = WorkQueue::new();
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 0, 0);
        queue.push_continuation(Continuation {
            ray: Ray::new(Vec3::ONE, Vec3::X),
            x: 1,
            y: 0,
            token: ResumeToken::with_partition(vec![1, 2], 5),
        });
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 2, 0);
        assert_eq!(queue.size(), 3);

        assert!(matches!(queue.pop_front(), Some(WorkItem::Origin { x: 0, .. })));
        match queue.pop_front() {
            Some(WorkItem::Continuation(c)) => assert_eq!(c.token.partition_id(), Some(5)),
            other => panic!("expected continuation, got {:?}", other),
        }
        assert_eq!(queue.pop_front().map(|i| i.pixel()), Some((2, 0)));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_next_blocking_waits_for_producer() {
        let queue = Arc::new(WorkQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next_blocking().map(|i| i.pixel()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 4, 5);
        assert_eq!(consumer.join().unwrap(), Some((4, 5)));
    }

    #[test]
    fn test_empty_is_not_done_until_finished() {
        let queue = Arc::new(WorkQueue::new());
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 0, 0);
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 1, 0);
        queue.finish();

        // Items pushed before finish still drain.
        assert_eq!(queue.next_blocking().map(|i| i.pixel()), Some((0, 0)));
        assert_eq!(queue.next_blocking().map(|i| i.pixel()), Some((1, 0)));
        assert!(queue.next_blocking().is_none());
        assert!(queue.is_finished());
    }

    #[test]
    fn test_finish_wakes_idle_consumer() {
        let queue = Arc::new(WorkQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next_blocking().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        queue.finish();
        assert!(consumer.join().unwrap());
    }

    proptest! {
        #[test]
        fn test_fifo_law(pixels in proptest::collection::vec((0u32..4096, 0u32..4096), 0..200)) {
            let queue = WorkQueue::new();
            for &(x, y) in &pixels {
                queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), x, y);
            }
            prop_assert_eq!(queue.size(), pixels.len());

            let popped: Vec<_> = std::iter::from_fn(|| queue.pop_front())
                .map(|item| item.pixel())
                .collect();
            prop_assert_eq!(popped, pixels);
        }
    }
}
