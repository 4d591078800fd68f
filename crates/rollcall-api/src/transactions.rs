//! Ledger transactions and clearance

use chrono::NaiveDate;
use rollcall_util::{EventId, FineId, PaymentId, ServiceId, StudentId, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{FineRecord, PaymentRecord, ServiceRecord};

/// What a transaction represents, and therefore which way it moves the balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    Fine {
        fine_id: FineId,
        event_id: EventId,
    },
    CashPayment {
        payment_id: PaymentId,
        receipt_no: String,
    },
    ServiceCredit {
        service_id: ServiceId,
        hours: u32,
    },
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Fine { .. } => "fine",
            TransactionKind::CashPayment { .. } => "payment",
            TransactionKind::ServiceCredit { .. } => "service credit",
        }
    }
}

/// One monetary movement for a student. `amount` is always non-negative;
/// the sign comes from `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub kind: TransactionKind,
}

impl Transaction {
    /// Contribution to the balance: fines add, payments and credits subtract
    pub fn signed_amount(&self) -> Decimal {
        let magnitude = self.amount.abs();
        match self.kind {
            TransactionKind::Fine { .. } => magnitude,
            TransactionKind::CashPayment { .. } | TransactionKind::ServiceCredit { .. } => {
                -magnitude
            }
        }
    }

    pub fn is_debit(&self) -> bool {
        matches!(self.kind, TransactionKind::Fine { .. })
    }
}

impl From<&FineRecord> for Transaction {
    fn from(fine: &FineRecord) -> Self {
        Self {
            id: fine.transaction_id.clone(),
            student_id: fine.student_id.clone(),
            date: fine.date,
            amount: fine.amount,
            kind: TransactionKind::Fine {
                fine_id: fine.fine_id.clone(),
                event_id: fine.event_id.clone(),
            },
        }
    }
}

impl From<&PaymentRecord> for Transaction {
    fn from(payment: &PaymentRecord) -> Self {
        Self {
            id: payment.transaction_id.clone(),
            student_id: payment.student_id.clone(),
            date: payment.date,
            amount: payment.amount,
            kind: TransactionKind::CashPayment {
                payment_id: payment.payment_id.clone(),
                receipt_no: payment.receipt_no.clone(),
            },
        }
    }
}

impl From<&ServiceRecord> for Transaction {
    fn from(service: &ServiceRecord) -> Self {
        Self {
            id: service.service_id.credit_transaction_id(),
            student_id: service.student_id.clone(),
            date: service.date,
            amount: service.credit_amount,
            kind: TransactionKind::ServiceCredit {
                service_id: service.service_id.clone(),
                hours: service.hours,
            },
        }
    }
}

/// Whether a student may be cleared for the term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "balance", rename_all = "snake_case")]
pub enum ClearanceStatus {
    Cleared,
    WithBalance(Decimal),
}

impl ClearanceStatus {
    pub fn from_balance(balance: Decimal) -> Self {
        if balance <= Decimal::ZERO {
            ClearanceStatus::Cleared
        } else {
            ClearanceStatus::WithBalance(balance)
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, ClearanceStatus::Cleared)
    }
}

impl fmt::Display for ClearanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearanceStatus::Cleared => f.write_str("CLEARED"),
            ClearanceStatus::WithBalance(balance) => {
                write!(f, "WITH BALANCE (₱{:.2})", balance)
            }
        }
    }
}
