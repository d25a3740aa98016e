//! Reporting DTOs

use chrono::{DateTime, Utc};
use serde::Deserialize;

use domain_billing::DateRange;

/// Optional `[from, to)` bounds in RFC 3339
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl From<RangeParams> for DateRange {
    fn from(params: RangeParams) -> Self {
        DateRange {
            from: params.from,
            to: params.to,
        }
    }
}
