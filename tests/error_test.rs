//! Tests for error types

use std::path::PathBuf;

use posesweep::{Error, ErrorKind};

#[test]
fn test_configuration_error() {
    let error = Error::Configuration("noisy base missing".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("noisy base missing"));
    assert!(error_str.contains("fully built"));
    assert!(!error.is_recoverable());
}

#[test]
fn test_archive_error() {
    let error = Error::archive(PathBuf::from("bases/noisy/obj1.farc"), "truncated body");
    let error_str = format!("{error}");
    assert!(error_str.contains("Archive error"));
    assert!(error_str.contains("obj1.farc"));
    assert!(error_str.contains("truncated body"));
    assert_eq!(error.kind(), ErrorKind::Archive);
    assert!(error.is_recoverable());
}

#[test]
fn test_noise_application_error() {
    let error = Error::NoiseApplication("non-finite translation".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Noise application failed"));
    assert!(error.is_recoverable());
}

#[test]
fn test_external_process_error() {
    let error = Error::ExternalProcess("timed out after 600s".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("External process error"));
    assert!(error_str.contains("600s"));
    assert_eq!(error.kind().as_str(), "external_process");
    assert!(error.is_recoverable());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "results.csv");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert_eq!(error.kind(), ErrorKind::Io);
    assert!(!error.is_recoverable());
}

#[test]
fn test_serialization_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("Serialization error"));
    assert!(!error.is_recoverable());
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
    assert!(!error.is_recoverable());
}

#[test]
fn test_error_kind_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorKind::NoiseApplication).unwrap();
    assert_eq!(json, "\"noise_application\"");
}
