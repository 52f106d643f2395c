use serde::{Deserialize, Serialize};

/// Success envelope wrapping every API payload.
///
/// Mirrors the `{success, data, message}` shape the web frontend consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl<T> Envelope<T> {
    /// Wraps a payload with no message.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: String::new(),
        }
    }

    /// Wraps a payload with a human-readable message.
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }
}

impl Envelope<()> {
    /// A success response carrying only a message.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
        }
    }
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    /// Stable machine-readable category (`not_found`, `upload_incomplete`, ...).
    pub code: String,
    /// Human-readable detail, including the offending index or sizes.
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_empty_message() {
        let env = Envelope::ok(42u32);
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"success":true,"data":42}"#);
    }

    #[test]
    fn message_only_envelope_omits_data() {
        let env = Envelope::message_only("Upload cancelled successfully");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("data").is_none());
        assert_eq!(json["message"], "Upload cancelled successfully");
    }

    #[test]
    fn envelope_parses_without_data() {
        let env: Envelope<u32> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(env.data.is_none());
        assert!(env.message.is_empty());
    }

    #[test]
    fn error_body_is_never_success() {
        let body = ErrorBody::new("not_found", "upload session not found: abc");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "not_found");
    }
}
