//! Data models and structures
//!
//! Defines the request/result types callers exchange with the generation
//! client, plus environment-driven configuration.

use crate::ai::gemini::types::GenerateContentResponse;
use crate::ai::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundingLink {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextResponse {
    pub text: String,
    pub grounding_links: Vec<GroundingLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait3x4,
    Landscape4x3,
    Portrait9x16,
    Landscape16x9,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1:1" => Ok(AspectRatio::Square),
            "3:4" => Ok(AspectRatio::Portrait3x4),
            "4:3" => Ok(AspectRatio::Landscape4x3),
            "9:16" => Ok(AspectRatio::Portrait9x16),
            "16:9" => Ok(AspectRatio::Landscape16x9),
            other => Err(Error::Config(format!(
                "Unsupported aspect ratio '{}'. Expected one of 1:1, 3:4, 4:3, 9:16, 16:9",
                other
            ))),
        }
    }
}

/// Output shape requested from a complex task.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    /// JSON constrained by an OpenAPI-style schema object.
    JsonSchema(serde_json::Value),
}

/// Decoded binary media returned by image and video generation.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaAsset {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Self-contained displayable URL for the asset.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            "audio/wav" => "wav",
            _ => "bin",
        }
    }
}

/// A single generation request, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Text {
        prompt: String,
        history: Vec<Turn>,
    },
    Structured {
        prompt: String,
        system_instruction: Option<String>,
        format: ResponseFormat,
    },
    /// Question about an attached image, answered on the text tiers.
    Vision {
        prompt: String,
        image: MediaAsset,
        system_instruction: Option<String>,
    },
    Image {
        prompt: String,
        aspect_ratio: AspectRatio,
    },
    Video {
        prompt: String,
    },
    Speech {
        text: String,
        voice: String,
    },
}

#[derive(Debug)]
pub enum GenerationResult {
    Text(TextResponse),
    Structured(GenerateContentResponse),
    Image(MediaAsset),
    Video(MediaAsset),
    /// Base64 encoded audio exactly as the backend returned it.
    Speech(String),
}

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variables checked, in order, for the API credential.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub video_poll_interval: Duration,
    pub video_max_polls: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_string()))?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "NEXUS_RETRY_MAX", defaults.max_retries)?,
            initial_delay: Duration::from_millis(parse_or(
                &lookup,
                "NEXUS_RETRY_INITIAL_MS",
                defaults.initial_delay.as_millis() as u64,
            )?),
            ..defaults
        };

        Ok(Self {
            api_key,
            base_url: lookup("NEXUS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "NEXUS_REQUEST_TIMEOUT_SECS",
                120,
            )?),
            retry,
            video_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "NEXUS_VIDEO_POLL_SECS",
                10,
            )?),
            video_max_polls: parse_or(&lookup, "NEXUS_VIDEO_MAX_POLLS", 60)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid value '{}' for {}", raw, key))),
        None => Ok(default),
    }
}
