//! Test Data Builders
//!
//! Builders for the records billing reads, with sensible defaults so tests
//! only spell out the fields they care about.

use chrono::{DateTime, Utc};
use core_kernel::{AppointmentId, DoctorId, LabRequestId, Money, PatientId, PriceId};
use domain_billing::{Appointment, LabRequest, PriceListing, PriceType};

use crate::fixtures::{MoneyFixtures, TemporalFixtures};

/// Builder for appointments
pub struct AppointmentBuilder {
    id: AppointmentId,
    patient_id: PatientId,
    doctor_id: DoctorId,
    doctor_name: String,
    scheduled_at: DateTime<Utc>,
    is_paid: bool,
}

impl AppointmentBuilder {
    /// Starts an unpaid appointment with Dr. Lee for patient 3
    pub fn new(id: i64) -> Self {
        Self {
            id: AppointmentId::new(id),
            patient_id: PatientId::new(3),
            doctor_id: DoctorId::new(1),
            doctor_name: "Dr. Lee".to_string(),
            scheduled_at: TemporalFixtures::clinic_day(),
            is_paid: false,
        }
    }

    pub fn patient(mut self, patient_id: i64) -> Self {
        self.patient_id = PatientId::new(patient_id);
        self
    }

    pub fn doctor(mut self, doctor_id: i64, name: impl Into<String>) -> Self {
        self.doctor_id = DoctorId::new(doctor_id);
        self.doctor_name = name.into();
        self
    }

    pub fn paid(mut self) -> Self {
        self.is_paid = true;
        self
    }

    pub fn build(self) -> Appointment {
        Appointment {
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            doctor_name: self.doctor_name,
            scheduled_at: self.scheduled_at,
            is_paid: self.is_paid,
            created_at: self.scheduled_at,
        }
    }
}

/// Builder for lab requests
pub struct LabRequestBuilder {
    id: LabRequestId,
    patient_id: PatientId,
    doctor_id: Option<DoctorId>,
    price_id: PriceId,
    is_paid: bool,
}

impl LabRequestBuilder {
    pub fn new(id: i64, price_id: i64) -> Self {
        Self {
            id: LabRequestId::new(id),
            patient_id: PatientId::new(3),
            doctor_id: Some(DoctorId::new(1)),
            price_id: PriceId::new(price_id),
            is_paid: false,
        }
    }

    pub fn patient(mut self, patient_id: i64) -> Self {
        self.patient_id = PatientId::new(patient_id);
        self
    }

    /// Lab requests may be ordered without a referring doctor
    pub fn without_doctor(mut self) -> Self {
        self.doctor_id = None;
        self
    }

    pub fn paid(mut self) -> Self {
        self.is_paid = true;
        self
    }

    pub fn build(self) -> LabRequest {
        LabRequest {
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            price_id: self.price_id,
            is_paid: self.is_paid,
            created_at: TemporalFixtures::clinic_day(),
        }
    }
}

/// Builder for catalog listings
pub struct PriceListingBuilder {
    id: PriceId,
    price_type: PriceType,
    code: String,
    name: String,
    amount: Money,
    active: bool,
}

impl PriceListingBuilder {
    /// Active appointment fee of 50
    pub fn appointment(id: i64) -> Self {
        Self {
            id: PriceId::new(id),
            price_type: PriceType::Appointment,
            code: "CONSULT".to_string(),
            name: "Consultation".to_string(),
            amount: MoneyFixtures::appointment_fee(),
            active: true,
        }
    }

    /// Active lab listing
    pub fn lab(id: i64, code: impl Into<String>, name: impl Into<String>, amount: Money) -> Self {
        Self {
            id: PriceId::new(id),
            price_type: PriceType::Lab,
            code: code.into(),
            name: name.into(),
            amount,
            active: true,
        }
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn build(self) -> PriceListing {
        let now = TemporalFixtures::clinic_day();
        PriceListing {
            id: self.id,
            price_type: self.price_type,
            code: self.code,
            name: self.name,
            amount: self.amount,
            active: self.active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appointment_builder_defaults() {
        let appointment = AppointmentBuilder::new(7).build();
        assert_eq!(appointment.id, AppointmentId::new(7));
        assert_eq!(appointment.doctor_name, "Dr. Lee");
        assert!(!appointment.is_paid);
    }

    #[test]
    fn test_lab_request_without_doctor() {
        let lab = LabRequestBuilder::new(11, 2).without_doctor().build();
        assert!(lab.doctor_id.is_none());
        assert_eq!(lab.price_id, PriceId::new(2));
    }

    #[test]
    fn test_inactive_listing() {
        let listing = PriceListingBuilder::appointment(1).inactive().build();
        assert!(!listing.active);
        assert_eq!(listing.price_type, PriceType::Appointment);
    }
}
