//! Per-student ledger aggregation
//!
//! A ledger is rebuilt from its transactions on every request. The balance
//! reconciles three sources: fines raise it, cash payments and community
//! service credits lower it.

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{ClearanceStatus, Transaction, TransactionKind};
use rollcall_util::StudentId;
use rust_decimal::Decimal;
use serde::Serialize;

/// Reporting balance: what is still owed, never negative
pub fn outstanding_balance(fines: Decimal, payments: Decimal, credits: Decimal) -> Decimal {
    (fines - payments - credits).max(Decimal::ZERO)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ledger {
    pub student_id: StudentId,
    pub opening_balance: Decimal,
    transactions: Vec<Transaction>,
    /// Credit total supplied alongside the transactions
    service_credit_total: Decimal,
    /// Shown in statements only; already counted in `service_credit_total`
    service_entries: Vec<Transaction>,
    pub total_fines: Decimal,
    pub total_payments: Decimal,
    pub total_service_credits: Decimal,
    /// `opening + fines - payments - credits`, unclamped
    pub closing_balance: Decimal,
    pub last_updated: DateTime<Local>,
}

impl Ledger {
    /// Build a ledger from a student's transactions plus a separately
    /// sourced service credit total.
    pub fn aggregate(
        student_id: StudentId,
        opening_balance: Decimal,
        transactions: Vec<Transaction>,
        service_credit_total: Decimal,
        as_of: DateTime<Local>,
    ) -> Self {
        let mut ledger = Self {
            student_id,
            opening_balance,
            transactions,
            service_credit_total,
            service_entries: Vec::new(),
            total_fines: Decimal::ZERO,
            total_payments: Decimal::ZERO,
            total_service_credits: Decimal::ZERO,
            closing_balance: opening_balance,
            last_updated: as_of,
        };
        ledger.recompute();
        ledger
    }

    /// Attach display-only service credit entries
    pub fn with_service_entries(mut self, entries: Vec<Transaction>) -> Self {
        self.service_entries = entries;
        self
    }

    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
        self.recompute();
        self.last_updated = rollcall_util::now();
    }

    fn recompute(&mut self) {
        let mut fines = Decimal::ZERO;
        let mut payments = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        let mut net = Decimal::ZERO;

        for transaction in &self.transactions {
            let magnitude = transaction.amount.abs();
            match transaction.kind {
                TransactionKind::Fine { .. } => fines += magnitude,
                TransactionKind::CashPayment { .. } => payments += magnitude,
                TransactionKind::ServiceCredit { .. } => credits += magnitude,
            }
            net += transaction.signed_amount();
        }
        credits += self.service_credit_total;

        self.total_fines = fines;
        self.total_payments = payments;
        self.total_service_credits = credits;
        self.closing_balance = self.opening_balance + net - self.service_credit_total;
    }

    /// Transactions counted in the totals
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn service_entries(&self) -> &[Transaction] {
        &self.service_entries
    }

    /// Every entry for a statement, oldest first
    pub fn statement(&self) -> Vec<&Transaction> {
        let mut entries: Vec<&Transaction> = self
            .transactions
            .iter()
            .chain(self.service_entries.iter())
            .collect();
        entries.sort_by_key(|t| t.date);
        entries
    }

    /// Statement entries dated within `[start, end]`
    pub fn transactions_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Transaction> {
        self.statement()
            .into_iter()
            .filter(|t| start <= t.date && t.date <= end)
            .collect()
    }

    /// Closing balance floored at zero
    pub fn outstanding(&self) -> Decimal {
        self.closing_balance.max(Decimal::ZERO)
    }

    pub fn clearance(&self) -> ClearanceStatus {
        ClearanceStatus::from_balance(self.closing_balance)
    }
}
