//! Resilient access to the generative backend
//!
//! [`GenerationClient`] wraps a [`GenerativeBackend`] with quota-aware retry
//! and model-tier fallback for text, structured, image, video and speech
//! requests.

pub mod client;
pub mod complex;
pub mod gemini;
pub mod media;
pub mod mime;
pub mod mock;
pub mod retry;
pub mod text;
pub mod tiers;
pub mod video;

pub use client::{ClientOptions, GenerationClient};
pub use gemini::GeminiHttpClient;
pub use mock::MockBackend;
pub use retry::RetryPolicy;

use crate::Result;
use async_trait::async_trait;
use gemini::types::{
    GenerateContentRequest, GenerateContentResponse, VideoGenerationRequest, VideoOperation,
};

/// The narrow surface the resilience layer needs from a backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    async fn start_video(
        &self,
        model: &str,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation>;

    async fn poll_operation(&self, operation: &VideoOperation) -> Result<VideoOperation>;

    async fn download(&self, uri: &str) -> Result<Vec<u8>>;

    /// Re-reads the active API credential. Backends without one do nothing.
    fn refresh_credential(&self) -> Result<()> {
        Ok(())
    }
}
