//! Input ingestion settings: sources, telephony, transcription, wake-phrase activation.
//!
//! Discriminator fields (`sources`, `type`, `mode`, `provider`, `engine`, `output`) stay
//! as strings so the validator can report unknown values with the list of allowed ones.

use serde::{Deserialize, Serialize};

pub const SOURCE_API: &str = "api";
pub const SOURCE_TELEPHONY: &str = "telephony";

pub const MODE_ONLINE: &str = "online";
pub const MODE_OFFLINE: &str = "offline";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephony: Option<TelephonyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcriber: Option<TranscriberConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationConfig>,
}

impl InputConfig {
    pub fn has_source(&self, source: &str) -> bool {
        self.sources.iter().any(|s| s == source)
    }

    /// True when every configured source is `api` (and there is at least one).
    pub fn is_api_only(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(|s| s == SOURCE_API)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelephonyConfig {
    /// `local` or `online`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriberConfig {
    #[serde(default)]
    pub mode: String,
    /// `text` or `media`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<OnlineSpeechConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline: Option<OfflineSpeechConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationConfig {
    #[serde(default)]
    pub phrase: String,
    #[serde(default)]
    pub mode: String,
    /// Match threshold in `[0, 1]`; 0 means unset.
    #[serde(default)]
    pub sensitivity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<OnlineSpeechConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline: Option<OfflineSpeechConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineSpeechConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSpeechConfig {
    #[serde(default)]
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
