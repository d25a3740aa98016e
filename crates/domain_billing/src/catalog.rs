//! Price catalog
//!
//! Billable item definitions. Settlement only reads the catalog; listings are
//! created and edited by administrators. Amounts are copied onto invoice
//! lines at settlement time, so editing a listing never changes history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Money, PriceId};

use crate::error::BillingError;
use crate::ports::BillingTx;

/// Kind of billable item a listing prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    /// Consultation fee; the clinic has one canonical active listing
    Appointment,
    /// Lab test; each lab request links its own listing
    Lab,
}

impl PriceType {
    /// Returns the stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Appointment => "APPOINTMENT",
            PriceType::Lab => "LAB",
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPOINTMENT" => Ok(PriceType::Appointment),
            "LAB" => Ok(PriceType::Lab),
            other => Err(BillingError::InvalidPriceData(format!(
                "unknown price type '{}'",
                other
            ))),
        }
    }
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListing {
    pub id: PriceId,
    pub price_type: PriceType,
    /// Unique per price type
    pub code: String,
    pub name: String,
    pub amount: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceListing {
    pub price_type: PriceType,
    pub code: String,
    pub name: String,
    pub amount: Money,
    pub active: bool,
}

impl NewPriceListing {
    /// Validates the listing before it reaches storage
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.code.trim().is_empty() {
            return Err(BillingError::InvalidPriceData("code must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(BillingError::InvalidPriceData("name must not be empty".into()));
        }
        validate_amount(self.amount)
    }
}

fn validate_amount(amount: Money) -> Result<(), BillingError> {
    if amount.is_negative() {
        return Err(BillingError::InvalidPriceData(format!(
            "amount must not be negative, got {}",
            amount
        )));
    }
    amount
        .within_ledger_range()
        .map(|_| ())
        .map_err(|e| BillingError::InvalidPriceData(e.to_string()))
}

/// Partial update of a listing; code and type are fixed once created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub name: Option<String>,
    pub amount: Option<Money>,
    pub active: Option<bool>,
}

impl PriceUpdate {
    /// Validates the provided fields
    pub fn validate(&self) -> Result<(), BillingError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(BillingError::InvalidPriceData("name must not be empty".into()));
            }
        }
        match self.amount {
            Some(amount) => validate_amount(amount),
            None => Ok(()),
        }
    }

    /// Applies the update to a listing
    pub fn apply(&self, listing: &mut PriceListing, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            listing.name = name.clone();
        }
        if let Some(amount) = self.amount {
            listing.amount = amount;
        }
        if let Some(active) = self.active {
            listing.active = active;
        }
        listing.updated_at = now;
    }

    /// True when the update would make the listing the active appointment fee
    pub fn activates(&self) -> bool {
        self.active == Some(true)
    }
}

/// Filter for listing prices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceQuery {
    pub price_type: Option<PriceType>,
    pub active: Option<bool>,
}

impl PriceQuery {
    /// Returns true if the listing passes the filter
    pub fn matches(&self, listing: &PriceListing) -> bool {
        self.price_type.map_or(true, |t| listing.price_type == t)
            && self.active.map_or(true, |a| listing.active == a)
    }
}

/// Resolves the active listing of a type inside a unit of work
///
/// # Errors
///
/// `PricingNotConfigured` when no active listing of that type exists.
pub async fn resolve_active_price(
    tx: &mut dyn BillingTx,
    price_type: PriceType,
) -> Result<PriceListing, BillingError> {
    tx.active_price(price_type)
        .await?
        .ok_or_else(|| BillingError::PricingNotConfigured {
            price_type,
            detail: format!("no active {} listing in the catalog", price_type),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn listing(price_type: PriceType, active: bool) -> PriceListing {
        let now = Utc::now();
        PriceListing {
            id: PriceId::new(1),
            price_type,
            code: "CONSULT".into(),
            name: "Consultation".into(),
            amount: Money::new(dec!(50)),
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_price_type_parsing() {
        assert_eq!("appointment".parse::<PriceType>().unwrap(), PriceType::Appointment);
        assert_eq!("LAB".parse::<PriceType>().unwrap(), PriceType::Lab);
        assert!("pharmacy".parse::<PriceType>().is_err());
    }

    #[test]
    fn test_new_listing_rejects_negative_amount() {
        let new = NewPriceListing {
            price_type: PriceType::Lab,
            code: "GLU".into(),
            name: "Glucose Test".into(),
            amount: Money::new(dec!(-1)),
            active: true,
        };
        assert!(matches!(new.validate(), Err(BillingError::InvalidPriceData(_))));
    }

    #[test]
    fn test_new_listing_allows_zero_amount() {
        let new = NewPriceListing {
            price_type: PriceType::Lab,
            code: "FREE".into(),
            name: "Screening".into(),
            amount: Money::zero(),
            active: true,
        };
        assert!(new.validate().is_ok());
    }

    #[test]
    fn test_unstorable_amounts_rejected() {
        let too_large = Money::new(dec!(10000000000));
        let new = NewPriceListing {
            price_type: PriceType::Lab,
            code: "MRI".into(),
            name: "MRI".into(),
            amount: too_large,
            active: true,
        };
        assert!(matches!(new.validate(), Err(BillingError::InvalidPriceData(_))));

        let update = PriceUpdate {
            amount: Some(too_large),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(BillingError::InvalidPriceData(_))));
    }

    #[test]
    fn test_update_applies_fields() {
        let mut price = listing(PriceType::Appointment, true);
        let update = PriceUpdate {
            amount: Some(Money::new(dec!(65))),
            active: Some(false),
            ..Default::default()
        };
        update.apply(&mut price, Utc::now());
        assert_eq!(price.amount, Money::new(dec!(65)));
        assert!(!price.active);
        assert_eq!(price.name, "Consultation");
    }

    #[test]
    fn test_query_matches() {
        let active_appt = listing(PriceType::Appointment, true);
        assert!(PriceQuery::default().matches(&active_appt));
        assert!(PriceQuery { price_type: Some(PriceType::Appointment), active: Some(true) }.matches(&active_appt));
        assert!(!PriceQuery { price_type: Some(PriceType::Lab), active: None }.matches(&active_appt));
        assert!(!PriceQuery { price_type: None, active: Some(false) }.matches(&active_appt));
    }
}
