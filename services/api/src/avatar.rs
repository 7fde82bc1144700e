//! One-shot WebRTC offer relay to the avatar service.
//!
//! Stateless request/response; not part of the streaming session layer.

use crate::{
    config::AvatarConfig,
    models::{AnswerResponse, OfferRequest},
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::error;

const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Avatar {0} is not configured")]
    NotConfigured(&'static str),
    #[error("Failed to reach avatar offer endpoint")]
    Unreachable(#[source] reqwest::Error),
    #[error("Avatar offer request failed with status {0}")]
    Rejected(u16),
    #[error("Invalid response from avatar offer endpoint")]
    InvalidAnswer,
}

pub struct AvatarRelay {
    http: reqwest::Client,
    config: AvatarConfig,
}

impl AvatarRelay {
    pub fn new(config: AvatarConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    /// Forwards `offer` and returns the avatar service's answer SDP.
    pub async fn post_offer(&self, offer: &OfferRequest) -> Result<AnswerResponse, RelayError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RelayError::NotConfigured("API key"))?;
        let (endpoint, body) = build_offer(&self.config, offer)?;

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Error calling avatar offer endpoint");
                RelayError::Unreachable(e)
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "Avatar offer failed");
            return Err(RelayError::Rejected(status.as_u16()));
        }

        let data: Value = response.json().await.map_err(|e| {
            error!(error = ?e, "Avatar answer was not JSON");
            RelayError::InvalidAnswer
        })?;
        extract_answer(&data).map(AnswerResponse::new).ok_or_else(|| {
            error!(payload = %data, "Unexpected avatar answer payload");
            RelayError::InvalidAnswer
        })
    }
}

/// Resolves the endpoint and request body, falling back to configured
/// avatar and voice ids.
pub fn build_offer(
    config: &AvatarConfig,
    offer: &OfferRequest,
) -> Result<(String, Value), RelayError> {
    let avatar_id = offer
        .avatar_id
        .as_deref()
        .or(config.avatar_id.as_deref())
        .ok_or(RelayError::NotConfigured("avatar id"))?;

    let mut body = Map::new();
    body.insert("sdp".into(), Value::String(offer.sdp.clone()));
    body.insert("avatar_id".into(), Value::String(avatar_id.to_string()));
    if let Some(voice_id) = offer.voice_id.as_deref().or(config.voice_id.as_deref()) {
        body.insert("voice_id".into(), Value::String(voice_id.to_string()));
    }
    if let Some(session_name) = &offer.session_name {
        body.insert("session_name".into(), Value::String(session_name.clone()));
    }

    let endpoint = config.offer_endpoint.clone().unwrap_or_else(|| {
        format!(
            "{}/avatars/{}/webrtc",
            config.base_url.trim_end_matches('/'),
            avatar_id
        )
    });
    Ok((endpoint, Value::Object(body)))
}

/// The answer SDP lives under `sdp`, or `answer` on some deployments.
pub fn extract_answer(data: &Value) -> Option<String> {
    ["sdp", "answer"]
        .iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .find(|sdp| !sdp.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> AvatarConfig {
        AvatarConfig {
            api_key: Some("key".to_string()),
            avatar_id: Some("default-avatar".to_string()),
            voice_id: None,
            base_url: "https://avatar.test/v1/".to_string(),
            offer_endpoint: None,
        }
    }

    fn offer() -> OfferRequest {
        OfferRequest {
            sdp: "v=0".to_string(),
            avatar_id: None,
            voice_id: None,
            session_name: None,
        }
    }

    #[test]
    fn test_build_offer_uses_configured_defaults() {
        let (endpoint, body) = build_offer(&config(), &offer()).unwrap();
        assert_eq!(endpoint, "https://avatar.test/v1/avatars/default-avatar/webrtc");
        assert_eq!(body, json!({"sdp": "v=0", "avatar_id": "default-avatar"}));
    }

    #[test]
    fn test_build_offer_request_overrides() {
        let mut config = config();
        config.voice_id = Some("default-voice".to_string());
        config.offer_endpoint = Some("https://relay.test/offer".to_string());
        let request = OfferRequest {
            avatar_id: Some("custom".to_string()),
            session_name: Some("demo".to_string()),
            ..offer()
        };

        let (endpoint, body) = build_offer(&config, &request).unwrap();
        assert_eq!(endpoint, "https://relay.test/offer");
        assert_eq!(
            body,
            json!({
                "sdp": "v=0",
                "avatar_id": "custom",
                "voice_id": "default-voice",
                "session_name": "demo"
            })
        );
    }

    #[test]
    fn test_build_offer_requires_avatar_id() {
        let mut config = config();
        config.avatar_id = None;
        assert!(matches!(
            build_offer(&config, &offer()),
            Err(RelayError::NotConfigured("avatar id"))
        ));
    }

    #[tokio::test]
    async fn test_post_offer_requires_api_key() {
        let mut config = config();
        config.api_key = None;
        let relay = AvatarRelay::new(config).unwrap();
        assert!(matches!(
            relay.post_offer(&offer()).await,
            Err(RelayError::NotConfigured("API key"))
        ));
    }

    #[test]
    fn test_extract_answer_fallbacks() {
        assert_eq!(extract_answer(&json!({"sdp": "a"})), Some("a".to_string()));
        assert_eq!(extract_answer(&json!({"answer": "b"})), Some("b".to_string()));
        assert_eq!(
            extract_answer(&json!({"sdp": "", "answer": "c"})),
            Some("c".to_string())
        );
        assert_eq!(extract_answer(&json!({"sdp": 5, "answer": "d"})), Some("d".to_string()));
        assert_eq!(extract_answer(&json!({"sdp": ""})), None);
        assert_eq!(extract_answer(&json!({"sdp": 5})), None);
        assert_eq!(extract_answer(&json!({})), None);
    }
}
