use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::bail;
use crate::error::{ErrorKind, IngestResult};
use crate::queue::{EventQueue, QueuedEvent};
use crate::types::Event;

#[derive(Debug)]
struct TimedEntry {
    at: DateTime<Utc>,
    seq: u64,
    event: Event,
}

impl PartialEq for TimedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<QueuedEvent>,
    timed: BinaryHeap<Reverse<TimedEntry>>,
    next_seq: u64,
    closed: bool,
}

impl State {
    /// Moves timed entries that are due to the ready queue.
    fn promote_due(&mut self, now: DateTime<Utc>) {
        while self.timed.peek().is_some_and(|Reverse(entry)| entry.at <= now) {
            if let Some(Reverse(entry)) = self.timed.pop() {
                self.ready
                    .push_back(QueuedEvent::retry_at(entry.event, entry.at));
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

/// In-process [`EventQueue`] with a FIFO of ready events and a schedule of timed events.
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of events eligible now.
    pub fn ready_len(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.promote_due(Utc::now());
        state.ready.len()
    }

    /// Returns the number of events waiting for their scheduled time.
    pub fn pending_len(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.promote_due(Utc::now());
        state.timed.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Removes and returns every event still in the queue: ready events in FIFO order, then
    /// timed events by scheduled time.
    ///
    /// Used on shutdown so that no accepted event is lost.
    pub fn drain(&self) -> Vec<QueuedEvent> {
        let mut state = self.inner.state.lock();
        let mut timed: Vec<TimedEntry> = std::mem::take(&mut state.timed)
            .into_iter()
            .map(|Reverse(entry)| entry)
            .collect();
        timed.sort();

        std::mem::take(&mut state.ready)
            .into_iter()
            .chain(
                timed
                    .into_iter()
                    .map(|entry| QueuedEvent::retry_at(entry.event, entry.at)),
            )
            .collect()
    }

    fn push(&self, event: Event, at: Option<DateTime<Utc>>) -> IngestResult<()> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                bail!(ErrorKind::QueueClosed, "Queue is closed");
            }

            match at {
                Some(at) => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.timed.push(Reverse(TimedEntry { at, seq, event }));
                }
                None => state.ready.push_back(QueuedEvent::new(event)),
            }
        }

        self.inner.notify.notify_waiters();
        Ok(())
    }
}

impl EventQueue for MemoryQueue {
    async fn enqueue(&self, event: Event) -> IngestResult<()> {
        self.push(event, None)
    }

    async fn enqueue_at(&self, event: Event, at: DateTime<Utc>) -> IngestResult<()> {
        self.push(event, Some(at))
    }

    async fn dequeue(&self) -> IngestResult<Option<QueuedEvent>> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Registers interest before checking the state so no wakeup is missed.
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.inner.state.lock();
                state.promote_due(Utc::now());

                if let Some(event) = state.ready.pop_front() {
                    return Ok(Some(event));
                }
                if state.closed {
                    return Ok(None);
                }

                state.timed.peek().map(|Reverse(entry)| entry.at)
            };

            match next_due {
                Some(at) => {
                    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn close(&self) -> IngestResult<()> {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();

        Ok(())
    }
}
