use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Error body returned by the Snipe-IT API, e.g.
/// `{"status":"error","messages":"Unauthorized","payload":null}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    /// Either a plain string or a map of field validation errors.
    #[serde(default)]
    pub messages: Option<JsonValue>,
}

impl ErrorPayload {
    /// Parses an error body, falling back to an empty payload.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn into_message(self) -> String {
        if let Some(message) = self.message {
            return message;
        }
        match self.messages {
            Some(JsonValue::String(message)) => message,
            Some(JsonValue::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}
