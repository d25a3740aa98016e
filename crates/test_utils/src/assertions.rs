//! Custom Test Assertions
//!
//! Ledger-level checks that give more useful failure messages than a bare
//! `assert_eq!` over whole structures.

use std::collections::HashMap;

use core_kernel::{InvoiceId, Money};
use domain_billing::{BillingError, BillingErrorKind, Invoice, Payment};

/// Asserts the ledger invariants over a full snapshot
///
/// For every invoice: items sum to the total, payments never exceed the
/// total, and `is_paid` holds exactly when payments cover a positive total.
/// Every payment must reference a listed invoice.
///
/// # Panics
///
/// Panics with the offending invoice id on the first violation
pub fn assert_ledger_consistent(invoices: &[Invoice], payments: &[Payment]) {
    let mut paid: HashMap<InvoiceId, Money> = HashMap::new();
    for payment in payments {
        assert!(
            payment.amount.is_positive(),
            "payment {} has non-positive amount {}",
            payment.id,
            payment.amount
        );
        let running = paid.entry(payment.invoice_id).or_insert_with(Money::zero);
        *running = *running + payment.amount;
    }

    for invoice in invoices {
        assert_eq!(
            invoice.items_total(),
            invoice.total_amount,
            "invoice {} items do not sum to its total",
            invoice.id
        );
        let total_paid = paid.remove(&invoice.id).unwrap_or_else(Money::zero);
        assert!(
            total_paid <= invoice.total_amount,
            "invoice {} is overpaid: {} paid against {}",
            invoice.id,
            total_paid,
            invoice.total_amount
        );
        let covered = invoice.total_amount.is_positive() && total_paid >= invoice.total_amount;
        assert_eq!(
            invoice.is_paid, covered,
            "invoice {} has is_paid={} with {} paid against {}",
            invoice.id, invoice.is_paid, total_paid, invoice.total_amount
        );
    }

    assert!(
        paid.is_empty(),
        "payments reference unknown invoices: {:?}",
        paid.keys().collect::<Vec<_>>()
    );
}

/// Asserts that a result failed with the given error kind
pub fn assert_billing_error<T: std::fmt::Debug>(
    result: &Result<T, BillingError>,
    expected: BillingErrorKind,
) {
    match result {
        Ok(value) => panic!("expected {} error, got Ok({:?})", expected, value),
        Err(err) => assert_eq!(
            err.kind(),
            expected,
            "expected {} error, got {}",
            expected,
            err
        ),
    }
}
