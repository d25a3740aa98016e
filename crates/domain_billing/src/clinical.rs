//! Clinical events that can be billed
//!
//! Appointments and lab requests are owned by the scheduling and lab
//! workflows; billing reads them and is the only writer of their `is_paid`
//! flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AppointmentId, DoctorId, LabRequestId, PatientId, PriceId};

/// A scheduled consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    /// Display name of the attending doctor, used on the invoice line
    pub doctor_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// A lab test ordered for a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRequest {
    pub id: LabRequestId,
    pub patient_id: PatientId,
    pub doctor_id: Option<DoctorId>,
    /// Catalog listing captured when the test was ordered
    pub price_id: PriceId,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

/// The clinical event an invoice was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum BillingSource {
    Appointment(AppointmentId),
    LabRequest(LabRequestId),
}

impl BillingSource {
    /// Stored discriminator for the source type
    pub fn kind(&self) -> &'static str {
        match self {
            BillingSource::Appointment(_) => "appointment",
            BillingSource::LabRequest(_) => "lab_request",
        }
    }

    /// Entity name used in error messages
    pub fn entity(&self) -> &'static str {
        match self {
            BillingSource::Appointment(_) => "Appointment",
            BillingSource::LabRequest(_) => "LabRequest",
        }
    }

    /// Raw row id of the source event
    pub fn raw_id(&self) -> i64 {
        match self {
            BillingSource::Appointment(id) => id.value(),
            BillingSource::LabRequest(id) => id.value(),
        }
    }

    /// Rebuilds a source from its stored columns
    ///
    /// Returns `None` for an unknown discriminator.
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "appointment" => Some(BillingSource::Appointment(AppointmentId::new(id))),
            "lab_request" => Some(BillingSource::LabRequest(LabRequestId::new(id))),
            _ => None,
        }
    }
}

impl fmt::Display for BillingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingSource::Appointment(id) => write!(f, "{}", id),
            BillingSource::LabRequest(id) => write!(f, "{}", id),
        }
    }
}
