//! Property-Based Test Generators
//!
//! Proptest strategies for amounts and payment sequences that respect the
//! ledger's two-decimal cash amounts.

use core_kernel::Money;
use proptest::prelude::*;

/// Strategy for positive cash amounts, 0.01 to 10,000.00
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..1_000_000i64).prop_map(Money::from_minor)
}

/// Strategy for non-negative listing amounts, zero included
pub fn price_amount_strategy() -> impl Strategy<Value = Money> {
    (0i64..1_000_000i64).prop_map(Money::from_minor)
}

/// Strategy for an invoice's line amounts, one to five lines
pub fn line_amounts_strategy() -> impl Strategy<Value = Vec<Money>> {
    prop::collection::vec(positive_money_strategy(), 1..=5)
}

/// Strategy for a sequence of payment attempts against one invoice
pub fn payment_attempts_strategy() -> impl Strategy<Value = Vec<Money>> {
    prop::collection::vec(positive_money_strategy(), 1..=8)
}
