//! API Models
//!
//! Request and response bodies of the HTTP endpoints, annotated for OpenAPI
//! generation with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A WebRTC offer to relay to the avatar service.
#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct OfferRequest {
    #[schema(example = "v=0\r\no=- 46117317 2 IN IP4 127.0.0.1\r\n...")]
    pub sdp: String,
    /// Overrides the configured avatar.
    #[serde(default)]
    pub avatar_id: Option<String>,
    /// Overrides the configured voice.
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
}

/// The avatar service's WebRTC answer.
#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    #[schema(example = "answer")]
    pub kind: String,
}

impl AnswerResponse {
    pub fn new(sdp: String) -> Self {
        Self {
            sdp,
            kind: "answer".to_string(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_offer_request_optional_fields() {
        let json = r#"{"sdp": "v=0"}"#;
        let payload: OfferRequest = serde_json::from_str(json).unwrap();

        assert_eq!(payload.sdp, "v=0");
        assert_eq!(payload.avatar_id, None);
        assert_eq!(payload.voice_id, None);
        assert_eq!(payload.session_name, None);
    }

    #[test]
    fn test_offer_request_with_overrides() {
        let payload: OfferRequest = serde_json::from_value(serde_json::json!({
            "sdp": "v=0",
            "avatar_id": "a-1",
            "voice_id": "v-2",
            "session_name": "demo"
        }))
        .unwrap();

        assert_eq!(payload.avatar_id.as_deref(), Some("a-1"));
        assert_eq!(payload.voice_id.as_deref(), Some("v-2"));
        assert_eq!(payload.session_name.as_deref(), Some("demo"));
    }

    #[test]
    fn test_answer_response_serialization() {
        let json = serde_json::to_value(AnswerResponse::new("v=0 answer".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"sdp": "v=0 answer", "type": "answer"}));
    }

    #[test]
    fn test_missing_sdp_rejected() {
        assert!(serde_json::from_str::<OfferRequest>(r#"{"avatar_id": "a-1"}"#).is_err());
    }
}
