//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::PortError;

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("jwt_secret must not be empty");
    assert!(error.to_string().contains("Configuration error"));
}

#[test]
fn test_core_error_from_money_error() {
    let core_error: CoreError = MoneyError::Overflow.into();
    assert!(matches!(core_error, CoreError::Money(_)));
}

#[test]
fn test_port_error_validation_field() {
    let error = PortError::validation_field("must be positive", "amount");
    match error {
        PortError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("amount")),
        _ => panic!("Expected Validation error"),
    }
}
