use super::retry::RetryPolicy;
use super::{GeminiHttpClient, GenerativeBackend};
use crate::models::{Config, GenerationRequest, GenerationResult};
use crate::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry budgets and polling limits for a [`GenerationClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Budget for text, image and speech calls at a single tier.
    pub retry: RetryPolicy,
    /// Per-tier budget while cascading complex tasks.
    pub cascade_retry: RetryPolicy,
    pub video_poll_interval: Duration,
    pub video_max_polls: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cascade_retry: RetryPolicy::cascade(),
            video_poll_interval: Duration::from_secs(10),
            video_max_polls: 60,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry,
            video_poll_interval: config.video_poll_interval,
            video_max_polls: config.video_max_polls,
            ..Self::default()
        }
    }
}

/// One client per process, shared by reference with every caller.
///
/// The client holds no per-call state: backoff timers and tier positions live
/// inside each call, so concurrent callers never contend.
pub struct GenerationClient {
    pub(crate) backend: Box<dyn GenerativeBackend>,
    pub(crate) options: ClientOptions,
}

impl GenerationClient {
    pub fn new(backend: Box<dyn GenerativeBackend>, options: ClientOptions) -> Self {
        Self { backend, options }
    }

    /// Builds a client talking to the Gemini REST API.
    pub fn from_config(config: &Config) -> Self {
        tracing::info!("Generation backend: Gemini ({})", config.base_url);
        Self::new(
            Box::new(GeminiHttpClient::from_config(config)),
            ClientOptions::from_config(config),
        )
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Picks up a rotated API credential before the next backend call.
    pub fn refresh_credential(&self) -> Result<()> {
        self.backend.refresh_credential()
    }

    /// Dispatches a tagged request to the matching operation.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        match request {
            GenerationRequest::Text { prompt, history } => self
                .generate_text(prompt, history, cancel)
                .await
                .map(GenerationResult::Text),
            GenerationRequest::Structured {
                prompt,
                system_instruction,
                format,
            } => self
                .generate_complex_task(prompt, system_instruction.as_deref(), format, cancel)
                .await
                .map(GenerationResult::Structured),
            GenerationRequest::Vision {
                prompt,
                image,
                system_instruction,
            } => self
                .analyze_image(prompt, image, system_instruction.as_deref(), cancel)
                .await
                .map(GenerationResult::Text),
            GenerationRequest::Image {
                prompt,
                aspect_ratio,
            } => self
                .generate_image(prompt, *aspect_ratio, cancel)
                .await
                .map(GenerationResult::Image),
            GenerationRequest::Video { prompt } => self
                .generate_video(prompt, cancel)
                .await
                .map(GenerationResult::Video),
            GenerationRequest::Speech { text, voice } => self
                .generate_speech(text, voice, cancel)
                .await
                .map(GenerationResult::Speech),
        }
    }
}
