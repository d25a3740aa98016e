//! Financial reporting
//!
//! Read-only aggregation over committed invoices and payments. Revenue is
//! always the sum of recorded payment amounts; invoice totals are never
//! counted as revenue.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use core_kernel::{InvoiceId, Money, MoneyError, UserId};

use crate::invoice::Invoice;
use crate::payment::Payment;

/// Half-open time window `[from, to)`; an open bound is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Unbounded range
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }

    /// False when both bounds are set and `from` is after `to`
    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

/// Revenue collected on one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
    pub payment_count: usize,
}

/// Headline figures for the accounting dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub range: DateRange,
    /// Sum of payment amounts received in the range
    pub total_revenue: Money,
    pub payment_count: usize,
    /// Invoices created in the range
    pub invoice_count: usize,
    pub paid_invoice_count: usize,
    pub unpaid_invoice_count: usize,
    /// Amount still due on unpaid invoices created in the range
    pub outstanding_amount: Money,
    /// Ordered by date
    pub daily_revenue: Vec<DailyRevenue>,
}

/// Payments taken by one cashier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashierTotal {
    /// `None` groups payments whose cashier is unknown
    pub cashier_id: Option<UserId>,
    pub total: Money,
    pub payment_count: usize,
}

/// Builds the financial summary for a range
///
/// `payments` must hold every payment, not only those in the range, so that
/// the outstanding balance of an invoice accounts for later payments too.
pub fn summarize(
    invoices: &[Invoice],
    payments: &[Payment],
    range: DateRange,
) -> Result<FinancialSummary, MoneyError> {
    let mut paid_per_invoice: HashMap<InvoiceId, Money> = HashMap::new();
    for payment in payments {
        let entry = paid_per_invoice.entry(payment.invoice_id).or_insert_with(Money::zero);
        *entry = entry.checked_add(&payment.amount)?;
    }

    let mut daily: BTreeMap<NaiveDate, DailyRevenue> = BTreeMap::new();
    let mut total_revenue = Money::zero();
    let mut payment_count = 0;
    for payment in payments.iter().filter(|p| range.contains(p.created_at)) {
        total_revenue = total_revenue.checked_add(&payment.amount)?;
        payment_count += 1;

        let date = payment.created_at.date_naive();
        let bucket = daily.entry(date).or_insert_with(|| DailyRevenue {
            date,
            revenue: Money::zero(),
            payment_count: 0,
        });
        bucket.revenue = bucket.revenue.checked_add(&payment.amount)?;
        bucket.payment_count += 1;
    }

    let in_range: Vec<&Invoice> = invoices
        .iter()
        .filter(|inv| range.contains(inv.created_at))
        .collect();
    let paid_invoice_count = in_range.iter().filter(|inv| inv.is_paid).count();
    let mut outstanding_amount = Money::zero();
    for invoice in in_range.iter().filter(|inv| !inv.is_paid) {
        let paid = paid_per_invoice.get(&invoice.id).copied().unwrap_or_default();
        let due = invoice.total_amount.checked_sub(&paid)?.clamp_non_negative();
        outstanding_amount = outstanding_amount.checked_add(&due)?;
    }

    Ok(FinancialSummary {
        range,
        total_revenue,
        payment_count,
        invoice_count: in_range.len(),
        paid_invoice_count,
        unpaid_invoice_count: in_range.len() - paid_invoice_count,
        outstanding_amount,
        daily_revenue: daily.into_values().collect(),
    })
}

/// Totals payments per cashier, largest total first
pub fn totals_by_cashier(
    payments: &[Payment],
    range: DateRange,
) -> Result<Vec<CashierTotal>, MoneyError> {
    let mut by_cashier: HashMap<Option<UserId>, CashierTotal> = HashMap::new();
    for payment in payments.iter().filter(|p| range.contains(p.created_at)) {
        let entry = by_cashier.entry(payment.cashier_id).or_insert_with(|| CashierTotal {
            cashier_id: payment.cashier_id,
            total: Money::zero(),
            payment_count: 0,
        });
        entry.total = entry.total.checked_add(&payment.amount)?;
        entry.payment_count += 1;
    }

    let mut totals: Vec<CashierTotal> = by_cashier.into_values().collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total).then(a.cashier_id.cmp(&b.cashier_id)));
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_kernel::{PatientId, PaymentId};
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn invoice(id: i64, total: Money, is_paid: bool, created_at: DateTime<Utc>) -> Invoice {
        Invoice {
            id: InvoiceId::new(id),
            patient_id: PatientId::new(3),
            source: None,
            total_amount: total,
            is_paid,
            created_at,
            items: vec![],
        }
    }

    fn payment(id: i64, invoice: i64, amount: Money, cashier: Option<i64>, created_at: DateTime<Utc>) -> Payment {
        Payment {
            id: PaymentId::new(id),
            invoice_id: InvoiceId::new(invoice),
            amount,
            cashier_id: cashier.map(UserId::new),
            created_at,
        }
    }

    mod range_tests {
        use super::*;

        #[test]
        fn test_range_is_half_open() {
            let range = DateRange::between(at(1, 0), at(2, 0));
            assert!(range.contains(at(1, 0)));
            assert!(range.contains(at(1, 23)));
            assert!(!range.contains(at(2, 0)));
        }

        #[test]
        fn test_inverted_range_is_invalid() {
            assert!(!DateRange::between(at(2, 0), at(1, 0)).is_valid());
            assert!(DateRange::all().is_valid());
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn test_revenue_is_sum_of_payments() {
            let invoices = vec![
                invoice(1, Money::new(dec!(50)), true, at(1, 9)),
                invoice(2, Money::new(dec!(80)), false, at(1, 10)),
            ];
            let payments = vec![
                payment(1, 1, Money::new(dec!(50)), Some(2), at(1, 9)),
                payment(2, 2, Money::new(dec!(30)), Some(2), at(2, 11)),
            ];

            let summary = summarize(&invoices, &payments, DateRange::all()).unwrap();
            assert_eq!(summary.total_revenue, Money::new(dec!(80)));
            assert_eq!(summary.payment_count, 2);
            assert_eq!(summary.invoice_count, 2);
            assert_eq!(summary.paid_invoice_count, 1);
            assert_eq!(summary.unpaid_invoice_count, 1);
            assert_eq!(summary.outstanding_amount, Money::new(dec!(50)));
            assert_eq!(summary.daily_revenue.len(), 2);
            assert_eq!(summary.daily_revenue[0].date, at(1, 0).date_naive());
        }

        #[test]
        fn test_outstanding_counts_payments_outside_range() {
            let invoices = vec![invoice(1, Money::new(dec!(80)), false, at(1, 10))];
            let payments = vec![payment(1, 1, Money::new(dec!(30)), None, at(5, 10))];

            let summary = summarize(&invoices, &payments, DateRange::between(at(1, 0), at(2, 0))).unwrap();
            assert!(summary.total_revenue.is_zero());
            assert_eq!(summary.outstanding_amount, Money::new(dec!(50)));
        }

        #[test]
        fn test_overflowing_totals_are_reported() {
            let huge = Money::new(rust_decimal::Decimal::MAX / dec!(2) + dec!(1000));
            let invoices = vec![
                invoice(1, huge, true, at(1, 9)),
                invoice(2, huge, true, at(1, 10)),
            ];
            let payments = vec![
                payment(1, 1, huge, Some(2), at(1, 9)),
                payment(2, 2, huge, Some(2), at(1, 10)),
            ];

            assert_eq!(
                summarize(&invoices, &payments, DateRange::all()),
                Err(MoneyError::Overflow)
            );
            assert_eq!(
                totals_by_cashier(&payments, DateRange::all()),
                Err(MoneyError::Overflow)
            );
        }

        #[test]
        fn test_empty_ledger() {
            let summary = summarize(&[], &[], DateRange::all()).unwrap();
            assert!(summary.total_revenue.is_zero());
            assert_eq!(summary.invoice_count, 0);
            assert!(summary.daily_revenue.is_empty());
        }
    }

    mod cashier_tests {
        use super::*;

        #[test]
        fn test_totals_grouped_and_sorted() {
            let payments = vec![
                payment(1, 1, Money::new(dec!(20)), Some(4), at(1, 9)),
                payment(2, 2, Money::new(dec!(50)), Some(2), at(1, 9)),
                payment(3, 3, Money::new(dec!(10)), Some(4), at(1, 9)),
                payment(4, 4, Money::new(dec!(5)), None, at(1, 9)),
            ];

            let totals = totals_by_cashier(&payments, DateRange::all()).unwrap();
            assert_eq!(totals.len(), 3);
            assert_eq!(totals[0].cashier_id, Some(UserId::new(2)));
            assert_eq!(totals[1].total, Money::new(dec!(30)));
            assert_eq!(totals[1].payment_count, 2);
            assert_eq!(totals[2].cashier_id, None);
        }
    }
}
