//! Unit tests for the Identifiers module

use core_kernel::{
    PatientId, DoctorId, UserId, AppointmentId, LabRequestId,
    PriceId, InvoiceId, InvoiceItemId, PaymentId,
};

mod display_and_parse {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(PatientId::prefix(), "PAT");
        assert_eq!(DoctorId::prefix(), "DOC");
        assert_eq!(UserId::prefix(), "USR");
        assert_eq!(AppointmentId::prefix(), "APT");
        assert_eq!(LabRequestId::prefix(), "LAB");
        assert_eq!(PriceId::prefix(), "PRC");
        assert_eq!(InvoiceId::prefix(), "INV");
        assert_eq!(InvoiceItemId::prefix(), "INVI");
        assert_eq!(PaymentId::prefix(), "PAY");
    }

    #[test]
    fn test_display_format() {
        assert_eq!(LabRequestId::new(11).to_string(), "LAB-11");
    }

    #[test]
    fn test_from_str_with_and_without_prefix() {
        assert_eq!("INV-5".parse::<InvoiceId>().unwrap(), InvoiceId::new(5));
        assert_eq!("5".parse::<InvoiceId>().unwrap(), InvoiceId::new(5));
    }

    #[test]
    fn test_from_str_rejects_foreign_prefix() {
        assert!("PAY-5".parse::<InvoiceId>().is_err());
    }
}

mod conversions {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        let id = PatientId::new(3);
        assert_eq!(id.value(), 3);
        assert_eq!(i64::from(id), 3);
        assert_eq!(PatientId::from(3), id);
    }

    #[test]
    fn test_json_is_transparent() {
        let json = serde_json::to_string(&AppointmentId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: AppointmentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AppointmentId::new(7));
    }

    #[test]
    fn test_ordering_follows_sequence() {
        assert!(PaymentId::new(1) < PaymentId::new(2));
    }
}
