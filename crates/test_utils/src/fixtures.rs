//! Pre-built Test Fixtures
//!
//! The canonical clinic used across the suite: patient 3 has appointment 7
//! with Dr. Lee and lab request 11 for a Glucose Test. The appointment fee is
//! 50 and the glucose test is 20. Cashier 2 works the front desk and cashier
//! 4 the lab counter.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{AppointmentId, LabRequestId, Money, PatientId, PriceId, UserId};
use domain_billing::{BillingService, InMemoryBillingStore};
use rust_decimal_macros::dec;

use crate::builders::{AppointmentBuilder, LabRequestBuilder, PriceListingBuilder};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn appointment_fee() -> Money {
        Money::new(dec!(50.00))
    }

    pub fn glucose_test() -> Money {
        Money::new(dec!(20.00))
    }

    /// Partial payment that leaves a balance on the appointment fee
    pub fn partial_payment() -> Money {
        Money::new(dec!(30.00))
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// A fixed clinic day, 9:00 UTC on March 4, 2024
    pub fn clinic_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Identifiers of the canonical clinic scenario
pub struct ClinicFixture;

impl ClinicFixture {
    pub const PATIENT: i64 = 3;
    pub const DOCTOR: i64 = 1;
    pub const APPOINTMENT: i64 = 7;
    pub const LAB_REQUEST: i64 = 11;
    pub const APPOINTMENT_PRICE: i64 = 1;
    pub const GLUCOSE_PRICE: i64 = 2;
    pub const FRONT_DESK_CASHIER: i64 = 2;
    pub const LAB_CASHIER: i64 = 4;

    pub fn patient() -> PatientId {
        PatientId::new(Self::PATIENT)
    }

    pub fn appointment() -> AppointmentId {
        AppointmentId::new(Self::APPOINTMENT)
    }

    pub fn lab_request() -> LabRequestId {
        LabRequestId::new(Self::LAB_REQUEST)
    }

    pub fn glucose_price() -> PriceId {
        PriceId::new(Self::GLUCOSE_PRICE)
    }

    pub fn front_desk_cashier() -> UserId {
        UserId::new(Self::FRONT_DESK_CASHIER)
    }

    pub fn lab_cashier() -> UserId {
        UserId::new(Self::LAB_CASHIER)
    }

    /// Seeds the scenario into a fresh in-memory store
    pub fn in_memory() -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store.put_price(PriceListingBuilder::appointment(Self::APPOINTMENT_PRICE).build());
        store.put_price(
            PriceListingBuilder::lab(
                Self::GLUCOSE_PRICE,
                "GLU",
                "Glucose Test",
                MoneyFixtures::glucose_test(),
            )
            .build(),
        );
        store.put_appointment(
            AppointmentBuilder::new(Self::APPOINTMENT)
                .patient(Self::PATIENT)
                .doctor(Self::DOCTOR, "Dr. Lee")
                .build(),
        );
        store.put_lab_request(
            LabRequestBuilder::new(Self::LAB_REQUEST, Self::GLUCOSE_PRICE)
                .patient(Self::PATIENT)
                .build(),
        );
        store
    }

    /// A service over a freshly seeded in-memory store
    pub fn in_memory_service() -> (InMemoryBillingStore, BillingService) {
        let store = Self::in_memory();
        let service = BillingService::new(Arc::new(store.clone()));
        (store, service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::BillingStore;

    #[tokio::test]
    async fn test_in_memory_scenario_is_seeded() {
        let store = ClinicFixture::in_memory();
        let appointment = store
            .get_appointment(ClinicFixture::appointment())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(appointment.doctor_name, "Dr. Lee");
        assert_eq!(store.invoice_count(), 0);
    }
}
