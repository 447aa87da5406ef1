//! A bounded multi-producer, multi-consumer queue used to hand reusable batch
//! buffers between pipeline stages.
//!
//! Besides plain blocking operations it offers `*_timeout` variants so that a
//! stage waiting on its peer can wake up periodically and check a shared
//! failure flag instead of blocking forever.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outcome of a timed enqueue that did not succeed. The item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueTimeoutError<T> {
    /// The queue stayed full for the whole timeout.
    Timeout(T),
    /// All consumers are gone.
    Disconnected(T),
}

impl<T> EnqueueTimeoutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            EnqueueTimeoutError::Timeout(item) | EnqueueTimeoutError::Disconnected(item) => item,
        }
    }
}

/// Outcome of a dequeue that did not produce an item.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DequeueError {
    /// The queue stayed empty for the whole timeout.
    Timeout,
    /// The queue is empty and all producers are gone.
    Disconnected,
}

impl std::fmt::Display for DequeueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DequeueError::Timeout => write!(f, "queue is empty"),
            DequeueError::Disconnected => write!(f, "queue is empty and disconnected"),
        }
    }
}

impl std::error::Error for DequeueError {}

/// A simple, blocking, multi-producer, multi-consumer queue.
///
/// Cloning produces another handle to the same queue without registering a new
/// producer or consumer; use [`add_producer`](Self::add_producer) and
/// [`add_consumer`](Self::add_consumer) for that.
pub struct SimpleMpmcQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SimpleMpmcQueue<T> {
    fn clone(&self) -> Self {
        SimpleMpmcQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SimpleMpmcQueue<T> {
    /// Creates a queue holding at most `capacity` items, with one producer and
    /// one consumer registered.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "SimpleMpmcQueue does not support zero capacity");
        SimpleMpmcQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(InnerState {
                    queue: VecDeque::with_capacity(capacity),
                    capacity,
                    producers: 1,
                    consumers: 1,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    pub fn add_producer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            state.producers != 0,
            "Attempt to add producer when the queue is half-closed"
        );
        state.producers += 1;
    }

    /// De-registers a producer. Once none remain, consumers drain the queue and
    /// then observe `Disconnected`.
    pub fn drop_producer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            state.producers >= 1,
            "drop_producer is called more times than add_producer"
        );
        state.producers -= 1;
        if state.producers == 0 {
            self.inner.not_empty.notify_all();
        }
    }

    pub fn add_consumer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            state.consumers > 0,
            "Attempt to add consumer when the queue is closed"
        );
        state.consumers += 1;
    }

    /// De-registers a consumer. Once none remain, queued items are dropped and
    /// enqueue attempts fail.
    pub fn drop_consumer(&self) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            state.consumers > 0,
            "drop_consumer is called more times than add_consumer"
        );
        state.consumers -= 1;
        if state.consumers == 0 {
            state.queue.clear();
            self.inner.not_full.notify_all();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues an item, blocking while the queue is full.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if state.consumers == 0 {
                return Err(item);
            }
            if state.queue.len() < state.capacity {
                break;
            }
            state = self.inner.not_full.wait(state).unwrap();
        }
        state.queue.push_back(item);
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Enqueues an item, waiting at most `timeout` for space.
    pub fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<(), EnqueueTimeoutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if state.consumers == 0 {
                return Err(EnqueueTimeoutError::Disconnected(item));
            }
            if state.queue.len() < state.capacity {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EnqueueTimeoutError::Timeout(item));
            }
            state = self
                .inner
                .not_full
                .wait_timeout(state, deadline - now)
                .unwrap()
                .0;
        }
        state.queue.push_back(item);
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues an item, blocking while the queue is empty and producers remain.
    pub fn dequeue(&self) -> Result<T, DequeueError> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.inner.not_full.notify_one();
                return Ok(item);
            }
            if state.producers == 0 {
                return Err(DequeueError::Disconnected);
            }
            state = self.inner.not_empty.wait(state).unwrap();
        }
    }

    /// Dequeues an item, waiting at most `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, DequeueError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.inner.not_full.notify_one();
                return Ok(item);
            }
            if state.producers == 0 {
                return Err(DequeueError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DequeueError::Timeout);
            }
            state = self
                .inner
                .not_empty
                .wait_timeout(state, deadline - now)
                .unwrap()
                .0;
        }
    }

    /// Dequeues an item if one is immediately available.
    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.inner.state.lock().unwrap().queue.pop_front();
        if item.is_some() {
            self.inner.not_full.notify_one();
        }
        item
    }
}

struct InnerState<T> {
    queue: VecDeque<T>,
    capacity: usize,
    producers: usize,
    consumers: usize,
}

struct Inner<T> {
    state: Mutex<InnerState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_single_thread() {
        let q = SimpleMpmcQueue::new(4);
        for i in 0..4 {
            q.enqueue(i).unwrap();
        }
        assert_eq!(q.len(), 4);
        for i in 0..4 {
            assert_eq!(q.dequeue().unwrap(), i);
        }
        assert!(q.try_dequeue().is_none());
    }

    #[test]
    fn test_timeouts() {
        let q = SimpleMpmcQueue::new(1);
        assert_eq!(
            q.dequeue_timeout(Duration::from_millis(5)),
            Err(DequeueError::Timeout)
        );
        q.enqueue_timeout(1, Duration::from_millis(5)).unwrap();
        assert_eq!(
            q.enqueue_timeout(2, Duration::from_millis(5)),
            Err(EnqueueTimeoutError::Timeout(2))
        );
        assert_eq!(q.dequeue_timeout(Duration::from_millis(5)), Ok(1));
    }

    #[test]
    fn test_disconnect() {
        let q = SimpleMpmcQueue::new(2);
        q.enqueue(7).unwrap();
        q.drop_producer();
        assert_eq!(q.dequeue(), Ok(7));
        assert_eq!(q.dequeue(), Err(DequeueError::Disconnected));
        assert_eq!(
            q.dequeue_timeout(Duration::from_millis(1)),
            Err(DequeueError::Disconnected)
        );

        let q = SimpleMpmcQueue::new(2);
        q.drop_consumer();
        assert_eq!(q.enqueue(1), Err(1));
        assert_eq!(
            q.enqueue_timeout(2, Duration::from_millis(1))
                .unwrap_err()
                .into_inner(),
            2
        );
    }

    #[test]
    fn test_back_pressure_between_threads() {
        let q = SimpleMpmcQueue::new(2);
        let producer = q.clone();
        let handle = thread::spawn(move || {
            for i in 0..1000u32 {
                let mut item = i;
                loop {
                    match producer.enqueue_timeout(item, Duration::from_millis(1)) {
                        Ok(()) => break,
                        Err(EnqueueTimeoutError::Timeout(back)) => item = back,
                        Err(EnqueueTimeoutError::Disconnected(_)) => panic!("disconnected"),
                    }
                }
            }
            producer.drop_producer();
        });
        let mut received = Vec::new();
        loop {
            match q.dequeue_timeout(Duration::from_millis(1)) {
                Ok(v) => received.push(v),
                Err(DequeueError::Timeout) => continue,
                Err(DequeueError::Disconnected) => break,
            }
        }
        handle.join().unwrap();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }
}
