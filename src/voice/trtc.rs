//! Tencent RTC voice backend
//!
//! Calls the TRTC `UpdateAIConversation` API to swap the TTS voice of a running
//! AI conversation, and `ControlAIConversation` to push text into one.
//! Requests are signed with TC3-HMAC-SHA256.

use super::{VoiceBackend, VoiceError};
use crate::persona::{Intent, PersonaRegistry};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "trtc";
const API_VERSION: &str = "2019-07-22";
const UPDATE_ACTION: &str = "UpdateAIConversation";
const CONTROL_ACTION: &str = "ControlAIConversation";
const SERVER_PUSH_TEXT: &str = "ServerPushText";
const SIGNING_ALGORITHM: &str = "TC3-HMAC-SHA256";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Default public TRTC API host
pub const DEFAULT_TRTC_ENDPOINT: &str = "trtc.tencentcloudapi.com";

/// Credentials for the Tencent TTS engine the conversation speaks through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TtsCredentials {
    pub app_id: u64,
    pub secret_id: String,
    pub secret_key: String,
}

/// TRTC client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrtcConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub region: String,
    /// Host name, or a full base URL when pointing at a non-default endpoint
    pub endpoint: String,
    pub tts: TtsCredentials,
    pub speed: f32,
    pub timeout: Duration,
}

impl Default for TrtcConfig {
    fn default() -> Self {
        Self {
            secret_id: String::new(),
            secret_key: String::new(),
            region: String::new(),
            endpoint: DEFAULT_TRTC_ENDPOINT.to_string(),
            tts: TtsCredentials::default(),
            speed: 1.0,
            timeout: Duration::from_secs(10),
        }
    }
}

/// TRTC API client
pub struct TrtcClient {
    config: TrtcConfig,
    personas: PersonaRegistry,
    client: Client,
    url: url::Url,
}

impl TrtcClient {
    pub fn new(config: TrtcConfig, personas: PersonaRegistry) -> Result<Self, VoiceError> {
        if config.secret_id.is_empty() || config.secret_key.is_empty() {
            warn!("TRTC credentials are empty; voice updates will be rejected by the API");
        }

        let url = Self::endpoint_url(&config.endpoint)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VoiceError::RequestFailed(e.to_string()))?;

        Ok(Self {
            config,
            personas,
            client,
            url,
        })
    }

    /// Resolve the configured endpoint to a URL, defaulting to HTTPS for bare hosts
    fn endpoint_url(endpoint: &str) -> Result<url::Url, VoiceError> {
        let endpoint = if endpoint.trim().is_empty() {
            DEFAULT_TRTC_ENDPOINT
        } else {
            endpoint.trim()
        };

        let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}/")
        };

        let url = url::Url::parse(&raw)
            .map_err(|e| VoiceError::NotConfigured(format!("Invalid TRTC endpoint {raw}: {e}")))?;
        if url.host_str().is_none() {
            return Err(VoiceError::NotConfigured(format!(
                "TRTC endpoint {raw} has no host"
            )));
        }
        Ok(url)
    }

    /// Host header value, including a non-default port
    fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or(DEFAULT_TRTC_ENDPOINT);
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// TTS configuration string for a voice type (pure function)
    fn tts_config(&self, voice_type: u32) -> String {
        json!({
            "TTSType": "tencent",
            "AppId": self.config.tts.app_id,
            "SecretId": self.config.tts.secret_id,
            "SecretKey": self.config.tts.secret_key,
            "VoiceType": voice_type,
            "Speed": self.config.speed,
        })
        .to_string()
    }

    /// Call `UpdateAIConversation` with a raw TTS config string
    pub async fn update_ai_conversation(
        &self,
        task_id: &str,
        tts_config: &str,
    ) -> Result<(), VoiceError> {
        let payload = json!({
            "TaskId": task_id,
            "TTSConfig": tts_config,
        });

        self.call(UPDATE_ACTION, task_id, payload, "update failed")
            .await
    }

    /// Push `text` into the conversation for the agent to speak
    pub async fn control_ai_conversation(&self, task_id: &str, text: &str) -> Result<(), VoiceError> {
        let payload = json!({
            "TaskId": task_id,
            "Command": SERVER_PUSH_TEXT,
            "ServerPushText": { "Text": text },
        });

        self.call(CONTROL_ACTION, task_id, payload, "control failed")
            .await
    }

    /// Send one signed API action and map the envelope to a result
    async fn call(
        &self,
        action: &str,
        task_id: &str,
        payload: serde_json::Value,
        failure: &str,
    ) -> Result<(), VoiceError> {
        let payload = payload.to_string();
        let timestamp = Utc::now().timestamp();
        let host = self.host();
        let authorization = sign_request(
            &self.config.secret_id,
            &self.config.secret_key,
            &host,
            &payload,
            timestamp,
        )?;

        debug!(task_id = %task_id, host = %host, action = action, "Sending TRTC request");

        let mut request = self
            .client
            .post(self.url.clone())
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", host)
            .header("X-TC-Action", action)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Version", API_VERSION);
        if !self.config.region.is_empty() {
            request = request.header("X-TC-Region", &self.config.region);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| VoiceError::RequestFailed(format!("{failure}: {e}")))?;

        let status = response.status();
        let body: TrtcEnvelope = response
            .json()
            .await
            .map_err(|e| VoiceError::InvalidResponse(format!("{status}: {e}")))?;

        if let Some(error) = body.response.error {
            return Err(VoiceError::ApiError {
                code: error.code,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(VoiceError::RequestFailed(format!(
                "{failure}: TRTC returned HTTP {status}"
            )));
        }

        debug!(
            task_id = %task_id,
            action = action,
            request_id = body.response.request_id.as_deref().unwrap_or("-"),
            "TRTC request succeeded"
        );
        Ok(())
    }
}

#[async_trait]
impl VoiceBackend for TrtcClient {
    async fn set_voice(&self, task_id: &str, intent: Intent) -> Result<(), VoiceError> {
        let voice_type = self
            .personas
            .voice_type(intent)
            .map_err(|e| VoiceError::NotConfigured(e.to_string()))?;

        self.update_ai_conversation(task_id, &self.tts_config(voice_type))
            .await
    }
}

fn hmac_sha256(key: &[u8], message: &str) -> Result<Vec<u8>, VoiceError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| VoiceError::NotConfigured(format!("invalid signing key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Build the TC3-HMAC-SHA256 `Authorization` header for a JSON POST to `/`
fn sign_request(
    secret_id: &str,
    secret_key: &str,
    host: &str,
    payload: &str,
    timestamp: i64,
) -> Result<String, VoiceError> {
    let date = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| VoiceError::RequestFailed(format!("invalid timestamp {timestamp}")))?
        .format("%Y-%m-%d")
        .to_string();

    let signed_headers = "content-type;host";
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{CONTENT_TYPE}\nhost:{host}\n\n{signed_headers}\n{}",
        sha256_hex(payload)
    );

    let credential_scope = format!("{date}/{SERVICE}/tc3_request");
    let string_to_sign = format!(
        "{SIGNING_ALGORITHM}\n{timestamp}\n{credential_scope}\n{}",
        sha256_hex(&canonical_request)
    );

    let secret_date = hmac_sha256(format!("TC3{secret_key}").as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, SERVICE)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{SIGNING_ALGORITHM} Credential={secret_id}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}"
    ))
}

#[derive(Debug, Deserialize)]
struct TrtcEnvelope {
    #[serde(rename = "Response")]
    response: TrtcResponse,
}

#[derive(Debug, Deserialize)]
struct TrtcResponse {
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
    #[serde(rename = "Error")]
    error: Option<TrtcError>,
}

#[derive(Debug, Deserialize)]
struct TrtcError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}
