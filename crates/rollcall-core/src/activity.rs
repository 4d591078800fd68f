//! Recent activity view

use rollcall_api::Transaction;
use std::collections::VecDeque;

/// Bounded newest-first stack of recent transactions.
///
/// Display only: the store remains the record of what happened.
#[derive(Debug, Clone)]
pub struct RecentActivityLog {
    capacity: usize,
    entries: VecDeque<Transaction>,
}

impl RecentActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a transaction, dropping the oldest one when full
    pub fn push(&mut self, transaction: Transaction) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(transaction);
    }

    /// Up to `n` most recent transactions, newest first
    pub fn peek_recent(&self, n: usize) -> Vec<Transaction> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
