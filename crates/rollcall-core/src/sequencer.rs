//! Arrival-order scan sequencing
//!
//! Readers on several threads admit scans as they arrive; each scan is then
//! processed only once every scan admitted before it has finished. A scan
//! leaves the queue when its processing returns, whether it succeeded,
//! failed or panicked.

use rollcall_api::ScanRequest;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Position of an admitted scan in the queue
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn number(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_ticket: u64,
    queue: VecDeque<(u64, ScanRequest)>,
    /// The head is being processed
    head_busy: bool,
}

/// FIFO admission queue for scan requests
#[derive(Debug, Default)]
pub struct ScanSequencer {
    state: Mutex<QueueState>,
    turn: Condvar,
}

/// Removes the head on drop so failures and panics still release the queue
struct HeadGuard<'a> {
    sequencer: &'a ScanSequencer,
}

impl Drop for HeadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.sequencer.lock();
        if let Some((ticket, _)) = state.queue.pop_front() {
            trace!(ticket, "Scan dequeued");
        }
        state.head_busy = false;
        drop(state);
        self.sequencer.turn.notify_all();
    }
}

impl ScanSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, state: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        self.turn.wait(state).unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the head and run `f` on it. The caller must hold the lock with
    /// an idle, non-empty queue.
    fn run_head<R>(
        &self,
        mut state: MutexGuard<'_, QueueState>,
        f: impl FnOnce(&ScanRequest) -> R,
    ) -> Option<R> {
        let request = state.queue.front()?.1.clone();
        state.head_busy = true;
        drop(state);

        let _guard = HeadGuard { sequencer: self };
        Some(f(&request))
    }

    /// Enqueue a scan and return its ticket
    pub fn admit(&self, request: ScanRequest) -> Ticket {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back((ticket, request));

        debug!(ticket, queued = state.queue.len(), "Scan admitted");
        Ticket(ticket)
    }

    /// Block until `ticket` reaches the head, run `f` on its request, then
    /// dequeue it. Returns `None` if the ticket is no longer queued.
    pub fn process<R>(&self, ticket: Ticket, f: impl FnOnce(&ScanRequest) -> R) -> Option<R> {
        let mut state = self.lock();
        loop {
            let position = state.queue.iter().position(|(t, _)| *t == ticket.0);
            match position {
                None => return None,
                Some(0) if !state.head_busy => break,
                Some(_) => state = self.wait(state),
            }
        }
        self.run_head(state, f)
    }

    /// Run `f` on the current head and dequeue it. A no-op returning `None`
    /// when the queue is empty.
    pub fn process_head<R>(&self, f: impl FnOnce(&ScanRequest) -> R) -> Option<R> {
        let mut state = self.lock();
        while state.head_busy {
            state = self.wait(state);
        }

        if state.queue.is_empty() {
            trace!("Sequencer empty, nothing to process");
            return None;
        }
        self.run_head(state, f)
    }

    /// Admit `request` and process it in turn. `None` only if another
    /// consumer took the request off the queue first.
    pub fn run<R>(&self, request: ScanRequest, f: impl FnOnce(&ScanRequest) -> R) -> Option<R> {
        let ticket = self.admit(request);
        self.process(ticket, f)
    }

    /// Number of scans waiting or in progress
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}
