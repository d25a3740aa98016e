//! Billing DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{Money, PatientId};
use domain_billing::{
    InvoiceDraft, InvoiceQuery, NewPriceListing, PriceQuery, PriceType, PriceUpdate,
};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct InvoiceItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(range(min = 1))]
    pub patient_id: i64,
    #[validate(length(min = 1), nested)]
    pub items: Vec<InvoiceItemRequest>,
}

impl CreateInvoiceRequest {
    /// Manual invoices are never linked to an appointment or lab request
    pub fn into_draft(self) -> InvoiceDraft {
        self.items.into_iter().fold(
            InvoiceDraft::for_patient(PatientId::new(self.patient_id)),
            |draft, item| draft.with_item(item.description, Money::new(item.amount)),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListParams {
    pub patient_id: Option<i64>,
    pub is_paid: Option<bool>,
}

impl From<InvoiceListParams> for InvoiceQuery {
    fn from(params: InvoiceListParams) -> Self {
        InvoiceQuery {
            patient_id: params.patient_id.map(PatientId::new),
            is_paid: params.is_paid,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceListParams {
    #[serde(rename = "type")]
    pub price_type: Option<PriceType>,
    pub active: Option<bool>,
}

impl From<PriceListParams> for PriceQuery {
    fn from(params: PriceListParams) -> Self {
        PriceQuery {
            price_type: params.price_type,
            active: params.active,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePriceRequest {
    pub price_type: PriceType,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub amount: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<CreatePriceRequest> for NewPriceListing {
    fn from(request: CreatePriceRequest) -> Self {
        NewPriceListing {
            price_type: request.price_type,
            code: request.code,
            name: request.name,
            amount: Money::new(request.amount),
            active: request.active,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePriceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub active: Option<bool>,
}

impl From<UpdatePriceRequest> for PriceUpdate {
    fn from(request: UpdatePriceRequest) -> Self {
        PriceUpdate {
            name: request.name,
            amount: request.amount.map(Money::new),
            active: request.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_invoice_request_builds_draft() {
        let request: CreateInvoiceRequest = serde_json::from_value(serde_json::json!({
            "patient_id": 3,
            "items": [
                {"description": "Dressing change", "amount": "30.00"},
                {"description": "Bandages", "amount": "20.00"}
            ]
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let draft = request.into_draft();
        assert_eq!(draft.patient_id, Some(PatientId::new(3)));
        assert_eq!(draft.items.len(), 2);
        assert_eq!(draft.items[1].amount, Money::new(dec!(20)));
    }

    #[test]
    fn test_empty_items_fail_validation() {
        let request = CreateInvoiceRequest {
            patient_id: 3,
            items: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_price_request_defaults_to_active() {
        let request: CreatePriceRequest = serde_json::from_value(serde_json::json!({
            "price_type": "LAB",
            "code": "CBC",
            "name": "Complete Blood Count",
            "amount": "35.00"
        }))
        .unwrap();
        assert!(request.active);
        assert_eq!(NewPriceListing::from(request).price_type, PriceType::Lab);
    }
}
