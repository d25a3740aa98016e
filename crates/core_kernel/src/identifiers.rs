//! Strongly-typed identifiers for domain entities
//!
//! Rows are keyed by database sequences, so every identifier is a newtype
//! over `i64`. The wrappers keep an appointment id from being passed where a
//! lab request id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw row identifier
            pub const fn value(&self) -> i64 {
                self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Strip prefix if present
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(raw.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

// People
define_id!(PatientId, "PAT");
define_id!(DoctorId, "DOC");
define_id!(UserId, "USR");

// Billable clinical events
define_id!(AppointmentId, "APT");
define_id!(LabRequestId, "LAB");

// Catalog and ledger
define_id!(PriceId, "PRC");
define_id!(InvoiceId, "INV");
define_id!(InvoiceItemId, "INVI");
define_id!(PaymentId, "PAY");
