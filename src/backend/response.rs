//! Interpretation of Responses API documents.

use serde_json::{json, Value};

/// Maximum number of output item types included in a summary.
const MAX_SUMMARY_TYPES: usize = 20;

/// Finds the base64 image in a response.
///
/// Looks for the first `output[]` item of type `image_generation_call` with a
/// non-empty `result`, or of type `image` with non-empty `data`; otherwise a
/// non-empty top-level `result` string.
#[must_use]
pub fn extract_image_base64(response: &Value) -> Option<&str> {
    fn non_empty(v: Option<&Value>) -> Option<&str> {
        v.and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    if let Some(items) = response.get("output").and_then(Value::as_array) {
        for item in items {
            match item.get("type").and_then(Value::as_str) {
                Some("image_generation_call") => {
                    if let Some(data) = non_empty(item.get("result")) {
                        return Some(data);
                    }
                }
                Some("image") => {
                    if let Some(data) = non_empty(item.get("data")) {
                        return Some(data);
                    }
                }
                _ => {}
            }
        }
    }

    non_empty(response.get("result"))
}

/// A compact description of a response, attached to "no image" errors.
#[must_use]
pub fn summarize_response(response: &Value) -> Value {
    let output = response.get("output").and_then(Value::as_array);
    let output_types = output.map(|items| {
        items
            .iter()
            .filter_map(|item| item.get("type").and_then(Value::as_str))
            .take(MAX_SUMMARY_TYPES)
            .collect::<Vec<_>>()
    });

    json!({
        "id": response.get("id").cloned().unwrap_or(Value::Null),
        "status": response.get("status").cloned().unwrap_or(Value::Null),
        "model": response.get("model").cloned().unwrap_or(Value::Null),
        "output_types": output_types,
        "has_output": output.is_some(),
    })
}
