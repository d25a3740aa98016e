//! Billing handlers
//!
//! Role gates are checked first; the acting cashier always comes from the
//! verified token, never from the request body.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;
use validator::Validate;

use core_kernel::{AppointmentId, InvoiceId, LabRequestId, Money, PriceId};
use domain_billing::{
    Appointment, Invoice, InvoiceDetails, LabRequest, PaymentReceipt, PriceListing, Settlement,
};

use crate::auth::{require_any_role, roles, Claims};
use crate::dto::billing::*;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Settles an appointment at the canonical appointment fee
#[instrument(skip(state, claims), fields(user = %claims.sub))]
pub async fn settle_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Settlement<Appointment>> {
    require_any_role(&claims, &[roles::CASHIER])?;
    let cashier_id = claims.user_id()?;

    let settlement = state
        .service
        .settle_appointment(AppointmentId::new(id), cashier_id)
        .await?;
    Ok(Json(ApiResponse::ok(settlement)))
}

/// Settles a lab request at its linked price
#[instrument(skip(state, claims), fields(user = %claims.sub))]
pub async fn settle_lab_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Settlement<LabRequest>> {
    require_any_role(&claims, &[roles::CASHIER])?;
    let cashier_id = claims.user_id()?;

    let settlement = state
        .service
        .settle_lab_request(LabRequestId::new(id), cashier_id)
        .await?;
    Ok(Json(ApiResponse::ok(settlement)))
}

/// Creates a manual invoice
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), ApiError> {
    require_any_role(&claims, &[roles::CASHIER])?;
    request.validate()?;

    let invoice = state.service.create_invoice(request.into_draft()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(invoice))))
}

/// Lists invoices, newest first
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<InvoiceListParams>,
) -> ApiResult<Vec<Invoice>> {
    require_any_role(&claims, &[roles::CASHIER, roles::ACCOUNTANT])?;

    let invoices = state.service.list_invoices(&params.into()).await?;
    Ok(Json(ApiResponse::ok(invoices)))
}

/// Gets an invoice with its payments and balance
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceDetails> {
    require_any_role(&claims, &[roles::CASHIER, roles::ACCOUNTANT])?;

    let details = state.service.get_invoice_details(InvoiceId::new(id)).await?;
    Ok(Json(ApiResponse::ok(details)))
}

/// Records a payment against an invoice
#[instrument(skip(state, claims, request), fields(user = %claims.sub))]
pub async fn add_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(request): Json<AddPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentReceipt>>), ApiError> {
    require_any_role(&claims, &[roles::CASHIER])?;
    let cashier_id = claims.user_id()?;

    let receipt = state
        .service
        .add_payment(InvoiceId::new(id), Money::new(request.amount), Some(cashier_id))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

pub async fn list_prices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<PriceListParams>,
) -> ApiResult<Vec<PriceListing>> {
    require_any_role(&claims, &[roles::CASHIER])?;

    let prices = state.service.list_prices(&params.into()).await?;
    Ok(Json(ApiResponse::ok(prices)))
}

pub async fn create_price(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreatePriceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PriceListing>>), ApiError> {
    require_any_role(&claims, &[roles::ADMIN])?;
    request.validate()?;

    let listing = state.service.create_price(request.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(listing))))
}

pub async fn update_price(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePriceRequest>,
) -> ApiResult<PriceListing> {
    require_any_role(&claims, &[roles::ADMIN])?;
    request.validate()?;

    let listing = state
        .service
        .update_price(PriceId::new(id), request.into())
        .await?;
    Ok(Json(ApiResponse::ok(listing)))
}
