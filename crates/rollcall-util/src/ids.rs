//! Strongly-typed identifiers for rollcall
//!
//! Student and event ids are assigned by the registrar and only wrapped here.
//! Record ids are generated as `<PREFIX>-XXXXXXXX`, eight upper-case hex
//! characters taken from a v4 UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        string_id!($(#[$meta])* $name);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(short_id(Self::PREFIX))
            }
        }
    };
}

string_id!(
    /// Registrar-assigned student number
    StudentId
);

string_id!(
    /// Identifier of a scheduled event
    EventId
);

generated_id!(
    /// Identifier of a single attendance record
    AttendanceId,
    "ATT"
);

generated_id!(
    /// Identifier of a fine
    FineId,
    "FINE"
);

generated_id!(
    /// Identifier of a cash payment
    PaymentId,
    "PAY"
);

generated_id!(
    /// Ledger-level transaction identifier shared by fines and payments
    TransactionId,
    "TXN"
);

generated_id!(
    /// Identifier of a community service record
    ServiceId,
    "SVC"
);

impl ServiceId {
    /// Display payment id used when a service credit is shown in a ledger
    pub fn credit_payment_id(&self) -> PaymentId {
        PaymentId::new(format!("SVC-PAY-{}", self.0))
    }

    /// Display transaction id used when a service credit is shown in a ledger
    pub fn credit_transaction_id(&self) -> TransactionId {
        TransactionId::new(format!("SVC-TXN-{}", self.0))
    }
}

fn short_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, simple[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_id_equality() {
        let id1 = StudentId::new("2023-0001");
        let id2 = StudentId::new("2023-0001");
        let id3 = StudentId::new("2023-0002");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn generated_ids_have_prefix_and_length() {
        let id = AttendanceId::generate();
        assert!(id.as_str().starts_with("ATT-"));
        assert_eq!(id.as_str().len(), "ATT-".len() + 8);

        let fine = FineId::generate();
        let suffix = &fine.as_str()["FINE-".len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TransactionId::generate(), TransactionId::generate());
    }

    #[test]
    fn service_credit_display_ids() {
        let service = ServiceId::new("SVC-1A2B3C4D");
        assert_eq!(service.credit_payment_id().as_str(), "SVC-PAY-SVC-1A2B3C4D");
        assert_eq!(service.credit_transaction_id().as_str(), "SVC-TXN-SVC-1A2B3C4D");
    }

    #[test]
    fn ids_serialize_deserialize() {
        let event_id = EventId::new("EVT-2025-001");
        let json = serde_json::to_string(&event_id).unwrap();
        assert_eq!(json, "\"EVT-2025-001\"");
        let parsed: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(event_id, parsed);
    }
}
