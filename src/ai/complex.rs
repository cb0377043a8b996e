//! Structured and reasoning-heavy tasks cascading pro → flash → lite.

use super::client::GenerationClient;
use super::gemini::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ThinkingConfig,
};
use super::retry::{with_quota_retry, TierOutcome};
use super::tiers::{ComplexModel, ModelTier};
use crate::models::ResponseFormat;
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl GenerationClient {
    /// Runs a complex task, preferring to degrade tiers over waiting out long
    /// backoff on an expensive one.
    ///
    /// Each tier gets the short cascade retry budget. Any failure moves on to
    /// the next tier; the last tier's error is returned as-is. The raw
    /// response is handed back, and parsing it is the caller's job.
    pub async fn generate_complex_task(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        format: &ResponseFormat,
        cancel: &CancellationToken,
    ) -> Result<GenerateContentResponse> {
        self.refresh_credential()?;

        let mut last_error = None;
        for model in ComplexModel::CASCADE {
            let request = complex_request(model, prompt, system_instruction, format);
            let result = with_quota_retry(&self.options.cascade_retry, cancel, || {
                self.backend.generate_content(model.model_id(), &request)
            })
            .await;

            match TierOutcome::from_result(result) {
                TierOutcome::Success(response) => {
                    info!("Complex task answered by {}", model.model_id());
                    return Ok(response);
                }
                TierOutcome::Exhausted(err) | TierOutcome::Failed(err) => {
                    warn!(
                        "{} failed ({}), moving to the next tier",
                        model.model_id(),
                        err
                    );
                    last_error = Some(err);
                }
                TierOutcome::Cancelled => return Err(Error::Cancelled),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Generic("No complex task tiers".to_string())))
    }
}

fn complex_request(
    model: ComplexModel,
    prompt: &str,
    system_instruction: Option<&str>,
    format: &ResponseFormat,
) -> GenerateContentRequest {
    let (response_mime_type, response_schema) = match format {
        ResponseFormat::Text => (None, None),
        ResponseFormat::Json => (Some("application/json".to_string()), None),
        ResponseFormat::JsonSchema(schema) => {
            (Some("application/json".to_string()), Some(schema.clone()))
        }
    };

    let generation_config = GenerationConfig {
        response_mime_type,
        response_schema,
        thinking_config: model
            .thinking_budget()
            .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        ..Default::default()
    };

    GenerateContentRequest {
        contents: vec![Content::text(Some("user"), prompt)],
        system_instruction: system_instruction.map(|text| Content::text(None, text)),
        generation_config: Some(generation_config),
        ..Default::default()
    }
}
