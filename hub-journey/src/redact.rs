//! Regex redaction of personally identifying strings.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Replacement token for every redacted match.
pub const REDACTION_TOKEN: &str = "***redacted***";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern")
});
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\-\s]{7,}\d").expect("phone pattern"));
static PASSPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{1,2}\d{6,9}\b").expect("passport pattern"));
static NATIONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{11}\b").expect("national id pattern"));

/// Redacts PHI substrings from a single string.
#[must_use]
pub fn redact_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let sanitized = EMAIL.replace_all(text, REDACTION_TOKEN);
    let sanitized = PHONE.replace_all(&sanitized, REDACTION_TOKEN);
    let sanitized = PASSPORT.replace_all(&sanitized, REDACTION_TOKEN);
    let sanitized = NATIONAL_ID.replace_all(&sanitized, REDACTION_TOKEN);
    sanitized.into_owned()
}

/// Recursively redacts every string inside a JSON object.
///
/// Strings are redacted, nested objects and arrays recursed, other scalars
/// pass through unchanged.
#[must_use]
pub fn redact_payload(payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| (key.clone(), redact_value(value)))
        .collect()
}

/// Recursively redacts every string inside a JSON value.
#[must_use]
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text)),
        Value::Object(map) => Value::Object(redact_payload(map)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
