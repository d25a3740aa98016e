//! PostgreSQL store tests for infra_db
//!
//! These tests start a PostgreSQL container and are ignored by default.
//! Run them with `cargo test -p infra_db -- --ignored` on a host with Docker.

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{InvoiceId, Money, PriceId};
use domain_billing::{
    BillingErrorKind, BillingService, BillingSource, BillingStore, InvoiceDraft, InvoiceQuery,
    NewPriceListing, PaymentQuery, PriceType, PriceUpdate,
};
use infra_db::PostgresBillingStore;
use test_utils::{
    assert_billing_error, assert_ledger_consistent, create_isolated_test_database, ClinicFixture,
    MoneyFixtures, TestDatabase,
};

async fn clinic() -> (TestDatabase, BillingService) {
    let db = create_isolated_test_database()
        .await
        .expect("Failed to create test database");
    db.seed_clinic().await.expect("Failed to seed clinic");
    let store = PostgresBillingStore::new(db.pool().clone());
    let service = BillingService::new(Arc::new(store));
    (db, service)
}

async fn assert_consistent(service: &BillingService) {
    let invoices = service.list_invoices(&InvoiceQuery::default()).await.unwrap();
    let payments = service.list_payments(&PaymentQuery::default()).await.unwrap();
    assert_ledger_consistent(&invoices, &payments);
}

mod settlement_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_appointment_settlement_persists_all_rows() {
        let (_db, service) = clinic().await;

        let settlement = service
            .settle_appointment(ClinicFixture::appointment(), ClinicFixture::front_desk_cashier())
            .await
            .unwrap();

        assert!(settlement.event.is_paid);
        assert!(settlement.invoice.is_paid);
        assert_eq!(settlement.invoice.total_amount, Money::new(dec!(50)));
        assert_eq!(settlement.invoice.items[0].description, "Appointment with Dr. Lee");
        assert_eq!(
            settlement.invoice.source,
            Some(BillingSource::Appointment(ClinicFixture::appointment()))
        );
        assert_eq!(settlement.payment.cashier_id, Some(ClinicFixture::front_desk_cashier()));

        let stored = service
            .store()
            .get_appointment(ClinicFixture::appointment())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_paid);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_second_settlement_is_rejected() {
        let (_db, service) = clinic().await;

        service
            .settle_lab_request(ClinicFixture::lab_request(), ClinicFixture::lab_cashier())
            .await
            .unwrap();
        let again = service
            .settle_lab_request(ClinicFixture::lab_request(), ClinicFixture::lab_cashier())
            .await;

        assert_billing_error(&again, BillingErrorKind::AlreadyPaid);
        let invoices = service.list_invoices(&InvoiceQuery::default()).await.unwrap();
        assert_eq!(invoices.len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_concurrent_settlements_produce_one_invoice() {
        let (_db, service) = clinic().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .settle_appointment(ClinicFixture::appointment(), ClinicFixture::front_desk_cashier())
                    .await
            }));
        }

        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => settled += 1,
                Err(err) => assert_eq!(err.kind(), BillingErrorKind::AlreadyPaid),
            }
        }

        assert_eq!(settled, 1);
        let payments = service.list_payments(&PaymentQuery::default()).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_consistent(&service).await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_manual_invoice_leaves_appointment_settleable() {
        let (_db, service) = clinic().await;
        service
            .create_invoice(
                InvoiceDraft::for_patient(core_kernel::PatientId::new(99))
                    .with_item("Consultation", MoneyFixtures::appointment_fee()),
            )
            .await
            .unwrap();

        let settlement = service
            .settle_appointment(ClinicFixture::appointment(), ClinicFixture::front_desk_cashier())
            .await
            .unwrap();

        assert!(settlement.event.is_paid);
        assert_eq!(settlement.invoice.patient_id, ClinicFixture::patient());
        assert_consistent(&service).await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_missing_appointment_is_not_found() {
        let (_db, service) = clinic().await;

        let result = service
            .settle_appointment(core_kernel::AppointmentId::new(999), ClinicFixture::front_desk_cashier())
            .await;

        assert_billing_error(&result, BillingErrorKind::NotFound);
    }
}

mod ledger_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_partial_payments_close_invoice() {
        let (_db, service) = clinic().await;
        let invoice = service
            .create_invoice(
                InvoiceDraft::for_patient(ClinicFixture::patient())
                    .with_item("Dressing change", Money::new(dec!(30)))
                    .with_item("Bandages", Money::new(dec!(20))),
            )
            .await
            .unwrap();

        let first = service
            .add_payment(invoice.id, MoneyFixtures::partial_payment(), Some(ClinicFixture::front_desk_cashier()))
            .await
            .unwrap();
        assert!(!first.invoice.is_paid);

        let second = service
            .add_payment(invoice.id, Money::new(dec!(20)), None)
            .await
            .unwrap();
        assert!(second.invoice.is_paid);

        let details = service.get_invoice_details(invoice.id).await.unwrap();
        assert_eq!(details.amount_paid, Money::new(dec!(50)));
        assert!(details.balance_due.is_zero());
        assert_consistent(&service).await;
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_overpayment_is_rejected() {
        let (_db, service) = clinic().await;
        let invoice = service
            .create_invoice(
                InvoiceDraft::for_patient(ClinicFixture::patient())
                    .with_item("Consultation", Money::new(dec!(50))),
            )
            .await
            .unwrap();

        service
            .add_payment(invoice.id, Money::new(dec!(30)), None)
            .await
            .unwrap();
        let result = service.add_payment(invoice.id, Money::new(dec!(30)), None).await;

        assert_billing_error(&result, BillingErrorKind::PaymentExceedsDue);
        let payments = service
            .list_payments(&PaymentQuery::for_invoice(invoice.id))
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_unstorable_amounts_are_validation_errors() {
        let (_db, service) = clinic().await;
        let huge = Money::new(dec!(10000000000));

        let invoice = service
            .create_invoice(InvoiceDraft::for_patient(ClinicFixture::patient()).with_item("Ward stay", huge))
            .await;
        assert_billing_error(&invoice, BillingErrorKind::InvalidInvoiceData);

        let invoice = service
            .create_invoice(
                InvoiceDraft::for_patient(ClinicFixture::patient())
                    .with_item("Consultation", Money::new(dec!(50))),
            )
            .await
            .unwrap();
        let payment = service.add_payment(invoice.id, huge, None).await;
        assert_billing_error(&payment, BillingErrorKind::InvalidPaymentData);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_payment_to_unknown_invoice_is_not_found() {
        let (_db, service) = clinic().await;

        let result = service
            .add_payment(InvoiceId::new(4242), Money::new(dec!(10)), None)
            .await;

        assert_billing_error(&result, BillingErrorKind::NotFound);
    }
}

mod catalog_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_second_active_appointment_price_is_rejected() {
        let (_db, service) = clinic().await;

        let result = service
            .create_price(NewPriceListing {
                price_type: PriceType::Appointment,
                code: "CONSULT-2".into(),
                name: "Second consultation".into(),
                amount: Money::new(dec!(60)),
                active: true,
            })
            .await;

        assert_billing_error(&result, BillingErrorKind::InvalidPriceData);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_price_edit_does_not_rewrite_invoices() {
        let (_db, service) = clinic().await;
        let settlement = service
            .settle_lab_request(ClinicFixture::lab_request(), ClinicFixture::lab_cashier())
            .await
            .unwrap();

        service
            .update_price(
                ClinicFixture::glucose_price(),
                PriceUpdate {
                    amount: Some(Money::new(dec!(25))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let invoice = service.get_invoice(settlement.invoice.id).await.unwrap();
        assert_eq!(invoice.total_amount, Money::new(dec!(20)));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_unknown_price_update_is_not_found() {
        let (_db, service) = clinic().await;

        let result = service
            .update_price(
                PriceId::new(999),
                PriceUpdate {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await;

        assert_billing_error(&result, BillingErrorKind::NotFound);
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_health_check_reports_healthy() {
        let (_db, service) = clinic().await;

        let health = service.health().await;

        assert!(health.is_available());
        assert_eq!(health.adapter_id, "postgres-billing-store");
    }
}
