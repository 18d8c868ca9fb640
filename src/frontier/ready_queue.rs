//! Delay-ordered queue of executions waiting for their next fetch
//!
//! Each execution appears at most once. Taking it out hands exclusive
//! ownership to one worker until that worker schedules it again, so two
//! workers never process the same execution at the same time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    ready_at: Instant,
    ticket: u64,
    execution_id: String,
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Current ticket per queued execution; heap entries with another ticket are stale
    queued: HashMap<String, u64>,
    next_ticket: u64,
}

impl Inner {
    fn push(&mut self, execution_id: &str, ready_at: Instant) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.queued.insert(execution_id.to_string(), ticket);
        self.heap.push(Reverse(Entry {
            ready_at,
            ticket,
            execution_id: execution_id.to_string(),
        }));
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.queued.get(&top.execution_id) == Some(&top.ticket) {
                return;
            }
            self.heap.pop();
        }
    }
}

/// Outcome of one look at the queue
enum Poll {
    Ready(String),
    Wait(Instant),
    Empty,
}

pub(crate) struct ReadyQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues an execution to become ready after `delay`
    ///
    /// Replaces any earlier entry of the same execution.
    pub fn schedule(&self, execution_id: &str, delay: Duration) {
        self.lock().push(execution_id, Instant::now() + delay);
        self.notify.notify_one();
    }

    /// Makes a queued execution ready now
    ///
    /// Returns false if the execution is not queued, i.e. a worker owns it.
    pub fn wake_now(&self, execution_id: &str) -> bool {
        let mut inner = self.lock();
        if !inner.queued.contains_key(execution_id) {
            return false;
        }
        inner.push(execution_id, Instant::now());
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Forgets a queued execution
    pub fn remove(&self, execution_id: &str) -> bool {
        self.lock().queued.remove(execution_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    fn poll(&self) -> Poll {
        let mut inner = self.lock();
        inner.drop_stale();

        let ready_at = match inner.heap.peek() {
            Some(Reverse(top)) => top.ready_at,
            None => return Poll::Empty,
        };

        if ready_at > Instant::now() {
            return Poll::Wait(ready_at);
        }

        match inner.heap.pop() {
            Some(Reverse(entry)) => {
                inner.queued.remove(&entry.execution_id);
                Poll::Ready(entry.execution_id)
            }
            None => Poll::Empty,
        }
    }

    /// Waits for the next execution whose delay has elapsed
    ///
    /// Returns `None` once `cancel` fires.
    pub async fn next_ready(&self, cancel: &CancellationToken) -> Option<String> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            match self.poll() {
                Poll::Ready(execution_id) => {
                    // Another entry may be ready as well; pass the wakeup on
                    if self.lock().heap.peek().is_some() {
                        self.notify.notify_one();
                    }
                    return Some(execution_id);
                }
                Poll::Wait(until) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(until) => {}
                    }
                }
                Poll::Empty => {
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }
}
