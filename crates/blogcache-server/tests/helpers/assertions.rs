//! Custom assertions para tests.

use serde_json::Value;

/// Verifica que una respuesta de error tenga el formato `{error, message}`.
pub fn assert_error_body(json: &Value, expected_error: &str) {
    let obj = json.as_object().expect("Error body should be a JSON object");

    assert_eq!(obj.len(), 2, "Unexpected error fields: {}", json);
    assert_eq!(obj["error"], expected_error);
    assert!(
        obj["message"].as_str().is_some_and(|m| !m.is_empty()),
        "'message' should be a non-empty string"
    );
}

/// Verifica los campos de un `InvalidationReport`.
pub fn assert_report_counts(json: &Value, immediate: u64, background: u64, stale: u64) {
    assert_eq!(json["immediate"], immediate, "report: {}", json);
    assert_eq!(json["background"], background, "report: {}", json);
    assert_eq!(json["stale"], stale, "report: {}", json);
}
