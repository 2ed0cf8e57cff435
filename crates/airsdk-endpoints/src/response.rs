//! Mapping of transport responses onto the error taxonomy.

use serde_json::{Map, Value};

use airsdk_core::{AirError, Result};
use airsdk_transport::ApiResponse;

/// Turn a non-2xx response into the matching [`AirError`].
///
/// `sent` are the field names of the request body, used to attribute a
/// validation failure when the server's detail does not name any of them.
pub(crate) fn check_status(
    response: &ApiResponse,
    model: &str,
    key: Option<&str>,
    sent: &[String],
) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }

    match response.status {
        404 => Err(AirError::not_found(model, key.unwrap_or("<collection>"))),
        400 | 422 => {
            let detail = response.body.clone().unwrap_or_else(|| Value::String(response.text.clone()));
            Err(AirError::validation(model, rejected_fields(&detail, sent), detail))
        }
        403 => Err(AirError::Forbidden(detail_text(response))),
        status => Err(AirError::unexpected(Some(status), detail_text(response))),
    }
}

/// Require a JSON object body.
pub(crate) fn object_body(response: ApiResponse) -> Result<Map<String, Value>> {
    match response.body {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(AirError::unexpected(
            Some(response.status),
            if response.text.is_empty() {
                "expected a JSON object, got an empty body".to_string()
            } else {
                response.text
            },
        )),
    }
}

fn rejected_fields(detail: &Value, sent: &[String]) -> Vec<String> {
    let mut named: Vec<String> = match detail {
        Value::Object(map) => sent
            .iter()
            .filter(|field| map.contains_key(field.as_str()))
            .cloned()
            .collect(),
        _ => Vec::new(),
    };
    if named.is_empty() {
        named = sent.to_vec();
    }
    named
}

fn detail_text(response: &ApiResponse) -> String {
    response
        .body
        .as_ref()
        .and_then(|body| body.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| response.text.clone())
}
