//! HTTP API tests for interface_api
//!
//! Requests go through the full router (auth, audit, handlers) over the
//! in-memory clinic scenario.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use core_kernel::UserId;
use domain_billing::InMemoryBillingStore;
use interface_api::auth::{create_token, roles};
use interface_api::config::ApiConfig;
use interface_api::create_router;
use test_utils::ClinicFixture;

const SECRET: &str = "api-test-secret";

fn app() -> (InMemoryBillingStore, Router) {
    let (store, service) = ClinicFixture::in_memory_service();
    let config = ApiConfig {
        jwt_secret: SECRET.to_string(),
        in_memory: true,
        ..ApiConfig::default()
    };
    (store, create_router(service, config))
}

fn token(user: i64, role: &str) -> String {
    create_token(UserId::new(user), vec![role.to_string()], SECRET, 300).unwrap()
}

fn cashier() -> String {
    token(ClinicFixture::FRONT_DESK_CASHIER, roles::CASHIER)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let (_store, app) = app();

        let (status, body) = send(&app, Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_reports_store() {
        let (_store, app) = app();

        let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store"], "in-memory-billing");
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (_store, app) = app();

        let (status, body) = send(&app, Method::POST, "/api/v1/billing/appointments/7/settle", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_accountant_cannot_settle() {
        let (store, app) = app();
        let accountant = token(5, roles::ACCOUNTANT);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&accountant),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
        assert_eq!(store.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_admin_passes_cashier_gate() {
        let (_store, app) = app();
        let admin = token(1, roles::ADMIN);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&admin),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
    }
}

mod settlement_tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_appointment_returns_event_invoice_and_payment() {
        let (_store, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["event"]["is_paid"], true);
        assert_eq!(data["invoice"]["is_paid"], true);
        assert_eq!(data["invoice"]["items"][0]["description"], "Appointment with Dr. Lee");
        assert_eq!(data["payment"]["cashier_id"], ClinicFixture::FRONT_DESK_CASHIER);
    }

    #[tokio::test]
    async fn test_second_settlement_is_already_paid() {
        let (store, app) = app();
        let lab_cashier = token(ClinicFixture::LAB_CASHIER, roles::CASHIER);
        let uri = "/api/v1/billing/lab-requests/11/settle";

        let (first, _) = send(&app, Method::POST, uri, Some(&lab_cashier), None).await;
        let (second, body) = send(&app, Method::POST, uri, Some(&lab_cashier), None).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "already_paid");
        assert_eq!(store.invoice_count(), 1);
        assert_eq!(store.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_appointment_is_not_found() {
        let (_store, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/999/settle",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_missing_appointment_price_is_pricing_not_configured() {
        let (_store, app) = app();
        let admin = token(1, roles::ADMIN);

        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/billing/prices/1",
            Some(&admin),
            Some(json!({"active": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "pricing_not_configured");
    }
}

mod invoice_tests {
    use super::*;

    async fn create_manual_invoice(app: &Router) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/billing/invoices",
            Some(&cashier()),
            Some(json!({
                "patient_id": ClinicFixture::PATIENT,
                "items": [
                    {"description": "Dressing change", "amount": "30.00"},
                    {"description": "Bandages", "amount": "20.00"}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_partial_payments_then_details() {
        let (_store, app) = app();
        let id = create_manual_invoice(&app).await;
        let uri = format!("/api/v1/billing/invoices/{}/payments", id);

        let (status, body) = send(&app, Method::POST, &uri, Some(&cashier()), Some(json!({"amount": "30.00"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["invoice"]["is_paid"], false);

        let (status, body) = send(&app, Method::POST, &uri, Some(&cashier()), Some(json!({"amount": "20.00"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["invoice"]["is_paid"], true);

        let accountant = token(5, roles::ACCOUNTANT);
        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/billing/invoices/{}", id),
            Some(&accountant),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["payments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overpayment_is_rejected() {
        let (_store, app) = app();
        let id = create_manual_invoice(&app).await;
        let uri = format!("/api/v1/billing/invoices/{}/payments", id);

        send(&app, Method::POST, &uri, Some(&cashier()), Some(json!({"amount": "30.00"}))).await;
        let (status, body) = send(&app, Method::POST, &uri, Some(&cashier()), Some(json!({"amount": "30.00"}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "payment_exceeds_due");
    }

    #[tokio::test]
    async fn test_non_positive_payment_is_invalid() {
        let (_store, app) = app();
        let id = create_manual_invoice(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/billing/invoices/{}/payments", id),
            Some(&cashier()),
            Some(json!({"amount": "0"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_payment_data");
    }

    #[tokio::test]
    async fn test_invoice_request_cannot_claim_an_appointment() {
        let (store, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/invoices",
            Some(&cashier()),
            Some(json!({
                "patient_id": 99,
                "items": [{"description": "Consultation", "amount": "50.00"}],
                "source": {"type": "appointment", "id": ClinicFixture::APPOINTMENT}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"]["source"].is_null());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&cashier()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["event"]["is_paid"], true);
        assert_eq!(body["data"]["invoice"]["patient_id"], ClinicFixture::PATIENT);
        assert_eq!(store.invoice_count(), 2);
    }

    #[tokio::test]
    async fn test_unstorable_item_amount_is_invalid() {
        let (store, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/invoices",
            Some(&cashier()),
            Some(json!({
                "patient_id": 3,
                "items": [{"description": "Ward stay", "amount": "10000000000"}]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_invoice_data");
        assert_eq!(store.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_invoice_fails_validation() {
        let (_store, app) = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/invoices",
            Some(&cashier()),
            Some(json!({"patient_id": 3, "items": []})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
        assert!(body["details"].is_array());
    }

    #[tokio::test]
    async fn test_list_invoices_filters_by_paid_flag() {
        let (_store, app) = app();
        create_manual_invoice(&app).await;
        send(
            &app,
            Method::POST,
            "/api/v1/billing/appointments/7/settle",
            Some(&cashier()),
            None,
        )
        .await;

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/billing/invoices?is_paid=false",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let invoices = body["data"].as_array().unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0]["is_paid"], false);
    }
}

mod price_tests {
    use super::*;

    #[tokio::test]
    async fn test_cashier_cannot_create_price() {
        let (_store, app) = app();

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/billing/prices",
            Some(&cashier()),
            Some(json!({"price_type": "LAB", "code": "CBC", "name": "Complete Blood Count", "amount": "35.00"})),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_second_active_appointment_price_is_invalid() {
        let (_store, app) = app();
        let admin = token(1, roles::ADMIN);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/billing/prices",
            Some(&admin),
            Some(json!({"price_type": "APPOINTMENT", "code": "CONSULT-2", "name": "Follow-up", "amount": "40.00"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_price_data");
    }

    #[tokio::test]
    async fn test_list_prices_by_type() {
        let (_store, app) = app();

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/billing/prices?type=LAB",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let prices = body["data"].as_array().unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0]["code"], "GLU");
    }
}

mod report_tests {
    use super::*;

    #[tokio::test]
    async fn test_financial_summary_counts_settlements() {
        let (_store, app) = app();
        send(&app, Method::POST, "/api/v1/billing/appointments/7/settle", Some(&cashier()), None).await;
        send(&app, Method::POST, "/api/v1/billing/lab-requests/11/settle", Some(&cashier()), None).await;
        let accountant = token(5, roles::ACCOUNTANT);

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/reports/financial-summary",
            Some(&accountant),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["payment_count"], 2);
        assert_eq!(body["data"]["paid_invoice_count"], 2);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let (_store, app) = app();
        let accountant = token(5, roles::ACCOUNTANT);

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/reports/payments-by-cashier?from=2024-03-05T00:00:00Z&to=2024-03-04T00:00:00Z",
            Some(&accountant),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_cashier_cannot_read_reports() {
        let (_store, app) = app();

        let (status, _) = send(
            &app,
            Method::GET,
            "/api/v1/reports/financial-summary",
            Some(&cashier()),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
