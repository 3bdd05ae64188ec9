//! Tests for error types

use churnline::Error;

#[test]
fn test_not_found_error() {
    let error = Error::not_found("experiment", "telecom-churn");
    let error_str = format!("{error}");
    assert!(error_str.contains("experiment not found"));
    assert!(error_str.contains("telecom-churn"));
}

#[test]
fn test_empty_result_error() {
    let error = Error::EmptyResult {
        experiment: "telecom-churn".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("No completed runs"));
    assert!(error_str.contains("Wait for training"));
}

#[test]
fn test_invalid_run_error() {
    let error = Error::invalid_run("abc123", "run has no model artifact");
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid run abc123"));
    assert!(error_str.contains("no model artifact"));
}

#[test]
fn test_partial_promotion_error() {
    let error = Error::PartialPromotion {
        name: "telecom_churn_model".to_string(),
        version: 3,
        run_id: "abc123".to_string(),
        reason: "disk full".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("telecom_churn_model v3"));
    assert!(error_str.contains("disk full"));
    assert!(error_str.contains("reconcile --version 3"));
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("k must be greater than 0".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("k must be greater than 0"));
}

#[test]
fn test_model_unavailable_error() {
    let error = Error::ModelUnavailable("no version registered".to_string());
    assert!(format!("{error}").contains("Model unavailable"));
}

#[test]
fn test_config_error() {
    let error = Error::Config("tracking.max_candidates must be at least 1".to_string());
    assert!(format!("{error}").contains("Configuration error"));
}

#[test]
fn test_lock_poisoned_error() {
    let error = Error::LockPoisoned("run registry");
    assert!(format!("{error}").contains("run registry"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_database_error_conversion() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let db_error = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
    let error: Error = db_error.into();
    assert!(matches!(error, Error::Database(_)));
    assert!(format!("{error}").contains("Database error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error".to_string());
    assert_eq!(format!("{error}"), "custom error");
}

#[test]
fn test_error_debug() {
    let error = Error::not_found("run", "r1");
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("NotFound"));
}
