//! Reporting handlers

use axum::{
    extract::{Query, State},
    Extension, Json,
};

use domain_billing::{CashierTotal, DateRange, FinancialSummary};

use crate::auth::{require_any_role, roles, Claims};
use crate::dto::reports::RangeParams;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

fn checked_range(params: RangeParams) -> Result<DateRange, ApiError> {
    let range = DateRange::from(params);
    if range.is_valid() {
        Ok(range)
    } else {
        Err(ApiError::validation("`from` must not be after `to`"))
    }
}

/// Revenue, invoice counts and outstanding balance over a range
pub async fn financial_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<FinancialSummary>>, ApiError> {
    require_any_role(&claims, &[roles::ACCOUNTANT])?;
    let range = checked_range(params)?;

    let summary = state.service.financial_summary(range).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

pub async fn payments_by_cashier(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<Vec<CashierTotal>>>, ApiError> {
    require_any_role(&claims, &[roles::ACCOUNTANT])?;
    let range = checked_range(params)?;

    let totals = state.service.payments_by_cashier(range).await?;
    Ok(Json(ApiResponse::ok(totals)))
}
