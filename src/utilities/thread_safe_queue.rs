//! Bounded multi-producer queue shared between crawl tasks and the flusher.
//!
//! Producers register through [`ThreadSafeQueue::create_producer`]; the
//! returned [`QueueProducer`] unregisters itself on drop. Once every
//! registered producer is gone, [`ThreadSafeQueue::producers_finished`]
//! turns true and stays true, which is the consumer's signal to do a final
//! drain and exit.

use crate::error::{CrawlError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Enqueue blocks while this many items are waiting.
    pub max_queue_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
        }
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    active_producers: usize,
    producers_done: bool,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    /// Wakes async producers parked by [`ThreadSafeQueue::enqueue_async`].
    space: Notify,
    max_queue_size: usize,
}

pub struct ThreadSafeQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ThreadSafeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ThreadSafeQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    active_producers: 0,
                    producers_done: false,
                    closed: false,
                }),
                not_full: Condvar::new(),
                space: Notify::new(),
                max_queue_size: config.max_queue_size.max(1),
            }),
        }
    }

    // A panicking producer must not wedge the flusher.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push an item, waiting for space if the queue is full.
    ///
    /// Fails with [`CrawlError::Cancelled`] once the queue has been closed.
    pub fn enqueue(&self, item: T) -> Result<()> {
        let mut state = self.lock();
        while !state.closed && state.items.len() >= self.shared.max_queue_size {
            state = self
                .shared
                .not_full
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        if state.closed {
            return Err(CrawlError::Cancelled);
        }
        state.items.push_back(item);
        Ok(())
    }

    /// Push an item from async code, yielding to the runtime instead of
    /// blocking the worker thread while the queue is full.
    pub async fn enqueue_async(&self, item: T) -> Result<()> {
        loop {
            let space = self.shared.space.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(CrawlError::Cancelled);
                }
                if state.items.len() < self.shared.max_queue_size {
                    state.items.push_back(item);
                    return Ok(());
                }
            }
            space.await;
        }
    }

    fn wake_producers(&self) {
        self.shared.not_full.notify_all();
        self.shared.space.notify_waiters();
    }

    pub fn dequeue(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.wake_producers();
        }
        item
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let items: Vec<T> = std::mem::take(&mut self.lock().items).into();
        if !items.is_empty() {
            self.wake_producers();
        }
        items
    }

    pub fn queue_size(&self) -> usize {
        self.lock().items.len()
    }

    /// Refuse further items and release any producer blocked on a full
    /// queue. Items already queued can still be dequeued.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake_producers();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn register_producer(&self) {
        self.lock().active_producers += 1;
    }

    pub fn unregister_producer(&self) {
        let mut state = self.lock();
        state.active_producers = state.active_producers.saturating_sub(1);
        if state.active_producers == 0 {
            state.producers_done = true;
        }
    }

    pub fn active_producer_count(&self) -> usize {
        self.lock().active_producers
    }

    /// True once the last registered producer has gone away. Never true for
    /// a queue that has not had a producer yet.
    pub fn producers_finished(&self) -> bool {
        self.lock().producers_done
    }

    pub fn create_producer(&self) -> QueueProducer<T> {
        self.register_producer();
        QueueProducer {
            queue: self.clone(),
        }
    }
}

/// Registered handle for submitting items; unregisters on drop.
pub struct QueueProducer<T> {
    queue: ThreadSafeQueue<T>,
}

impl<T> QueueProducer<T> {
    pub fn submit(&self, item: T) -> Result<()> {
        self.queue.enqueue(item)
    }
}

impl<T> Drop for QueueProducer<T> {
    fn drop(&mut self) {
        self.queue.unregister_producer();
    }
}
