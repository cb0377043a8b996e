//! Grounded chat and image questions with a lite-tier fallback.

use super::client::GenerationClient;
use super::gemini::types::{Content, GenerateContentRequest, GenerateContentResponse, Part, Tool};
use super::retry::{with_quota_retry, TierOutcome};
use super::tiers::{ModelTier, TextModel};
use crate::models::{GroundingLink, MediaAsset, Role, TextResponse, Turn};
use crate::{prompts, Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a text-tier request carries besides the model.
#[derive(Debug, Clone, Copy)]
struct TextInput<'a> {
    prompt: &'a str,
    history: &'a [Turn],
    attachments: &'a [MediaAsset],
    system_instruction: Option<&'a str>,
}

impl GenerationClient {
    /// Answers `prompt` in the context of `history`.
    ///
    /// The standard tier runs with search grounding. Only when it exhausts its
    /// retries on quota errors does the call drop to the lite tier, which is
    /// ungrounded and returns no links. Any other failure goes straight back
    /// to the caller.
    pub async fn generate_text(
        &self,
        prompt: &str,
        history: &[Turn],
        cancel: &CancellationToken,
    ) -> Result<TextResponse> {
        let input = TextInput {
            prompt,
            history,
            attachments: &[],
            system_instruction: None,
        };
        self.run_text_cascade(input, cancel).await
    }

    /// Answers `prompt` about `image`, sent inline ahead of the question.
    ///
    /// Uses the same tiers, retry budget and quota fallback as
    /// [`generate_text`](Self::generate_text).
    pub async fn analyze_image(
        &self,
        prompt: &str,
        image: &MediaAsset,
        system_instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TextResponse> {
        let input = TextInput {
            prompt,
            history: &[],
            attachments: std::slice::from_ref(image),
            system_instruction,
        };
        self.run_text_cascade(input, cancel).await
    }

    async fn run_text_cascade(
        &self,
        input: TextInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<TextResponse> {
        self.refresh_credential()?;

        let [standard, lite] = TextModel::CASCADE;
        match TierOutcome::from_result(self.run_text_tier(standard, input, cancel).await) {
            TierOutcome::Success(response) => Ok(response),
            TierOutcome::Exhausted(err) => {
                warn!(
                    "{} quota exhausted ({}), switching to {}",
                    standard.model_id(),
                    err,
                    lite.model_id()
                );
                self.run_text_tier(lite, input, cancel).await
            }
            TierOutcome::Failed(err) => Err(err),
            TierOutcome::Cancelled => Err(Error::Cancelled),
        }
    }

    async fn run_text_tier(
        &self,
        model: TextModel,
        input: TextInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<TextResponse> {
        let request = text_request(model, input);
        let response = with_quota_retry(&self.options.retry, cancel, || {
            self.backend.generate_content(model.model_id(), &request)
        })
        .await?;

        let text = response
            .text()
            .ok_or_else(|| Error::EmptyResponse("text".to_string()))?;
        let grounding_links = if model.grounded() {
            grounding_links(&response)
        } else {
            Vec::new()
        };

        info!(
            "{} answered ({} chars, {} sources)",
            model.model_id(),
            text.len(),
            grounding_links.len()
        );
        Ok(TextResponse {
            text,
            grounding_links,
        })
    }
}

fn text_request(model: TextModel, input: TextInput<'_>) -> GenerateContentRequest {
    // Attachments go ahead of the question in the final user turn.
    let mut parts: Vec<Part> = input
        .attachments
        .iter()
        .map(|asset| Part::inline(asset.mime_type.clone(), asset.to_base64()))
        .collect();
    parts.push(Part::Text {
        text: input.prompt.to_string(),
    });

    let contents = input
        .history
        .iter()
        .map(|turn| Content::text(Some(turn.role.as_str()), turn.text.clone()))
        .chain(std::iter::once(Content {
            role: Some(Role::User.as_str().to_string()),
            parts,
        }))
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction: input
            .system_instruction
            .map(|text| Content::text(None, text)),
        tools: if model.grounded() {
            vec![Tool::google_search()]
        } else {
            Vec::new()
        },
        ..Default::default()
    }
}

/// Web sources cited by the first candidate; chunks without a URI are dropped.
fn grounding_links(response: &GenerateContentResponse) -> Vec<GroundingLink> {
    response
        .grounding_chunks()
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            let uri = web.uri.clone().filter(|u| !u.is_empty())?;
            Some(GroundingLink {
                title: web
                    .title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| prompts::UNTITLED_SOURCE.to_string()),
                uri,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::ClientOptions;
    use crate::ai::gemini::types::{GroundingChunk, GroundingMetadata, WebSource};
    use crate::ai::{MockBackend, RetryPolicy};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const FLASH: &str = "gemini-3-flash-preview";
    const LITE: &str = "gemini-flash-lite-latest";

    fn client(backend: &MockBackend) -> GenerationClient {
        let options = ClientOptions {
            retry: RetryPolicy::default().without_jitter(),
            ..ClientOptions::default()
        };
        GenerationClient::new(Box::new(backend.clone()), options)
    }

    fn grounded_response(text: &str, sources: &[(Option<&str>, Option<&str>)]) -> GenerateContentResponse {
        let mut response = GenerateContentResponse::from_text(text);
        response.candidates[0].grounding_metadata = Some(GroundingMetadata {
            grounding_chunks: sources
                .iter()
                .map(|(title, uri)| GroundingChunk {
                    web: Some(WebSource {
                        title: title.map(str::to_string),
                        uri: uri.map(str::to_string),
                    }),
                })
                .collect(),
        });
        response
    }

    #[tokio::test(start_paused = true)]
    async fn test_grounded_answer_from_standard_tier() {
        let backend = MockBackend::new().with_content_response(
            FLASH,
            Ok(grounded_response(
                "Istanbul",
                &[
                    (Some("Wiki"), Some("https://wiki.example")),
                    (None, Some("https://untitled.example")),
                    (Some("No link"), None),
                ],
            )),
        );

        let history = vec![Turn::user("Largest city in Turkey?"), Turn::model("Let me check.")];
        let response = client(&backend)
            .generate_text("Answer please", &history, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.text, "Istanbul");
        assert_eq!(
            response.grounding_links,
            vec![
                GroundingLink {
                    title: "Wiki".to_string(),
                    uri: "https://wiki.example".to_string()
                },
                GroundingLink {
                    title: "Source".to_string(),
                    uri: "https://untitled.example".to_string()
                },
            ]
        );

        let requests = backend.content_requests();
        let request = &requests[0];
        assert_eq!(request.tools, vec![Tool::google_search()]);
        let roles: Vec<Option<&str>> = request.contents.iter().map(|c| c.role.as_deref()).collect();
        assert_eq!(roles, [Some(Role::User.as_str()), Some("model"), Some("user")]);
        assert_eq!(request.last_user_text(), Some("Answer please"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_exhaustion_falls_back_to_lite_without_grounding() {
        let backend = MockBackend::new()
            .with_content_errors(FLASH, 5, || Error::quota("Quota exceeded"))
            .with_content_response(
                LITE,
                Ok(grounded_response("lite answer", &[(Some("x"), Some("https://x"))])),
            );

        let response = client(&backend)
            .generate_text("hello", &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.text, "lite answer");
        assert!(response.grounding_links.is_empty());
        assert_eq!(
            backend.content_models(),
            [FLASH, FLASH, FLASH, FLASH, FLASH, LITE]
        );
        assert!(backend.content_requests()[5].tools.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_quota_error_does_not_fall_back() {
        let backend = MockBackend::new().with_content_response(
            FLASH,
            Err(Error::Backend {
                status: Some(400),
                code: Some("INVALID_ARGUMENT".to_string()),
                message: "bad request".to_string(),
            }),
        );

        let err = client(&backend)
            .generate_text("hello", &[], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Backend { status: Some(400), .. }));
        assert_eq!(backend.content_models(), [FLASH]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_tiers_exhausted_returns_lite_error() {
        let backend = MockBackend::new()
            .with_content_errors(FLASH, 5, || Error::quota("flash quota"))
            .with_content_errors(LITE, 5, || Error::quota("lite quota"));

        let err = client(&backend)
            .generate_text("hello", &[], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("lite quota"));
        assert_eq!(backend.content_models().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_keep_independent_backoff() {
        let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let seen = attempts.clone();
        let backend = MockBackend::new().with_content_handler(move |_, request| {
            let prompt = request.last_user_text().unwrap_or_default().to_string();
            let mut seen = seen.lock().unwrap();
            let attempt = seen.entry(prompt.clone()).or_insert(0);
            *attempt += 1;
            if prompt == "slow" && *attempt <= 4 {
                Err(Error::quota("429 Too Many Requests"))
            } else {
                Ok(GenerateContentResponse::from_text(format!("{} done", prompt)))
            }
        });
        let client = client(&backend);
        let cancel = CancellationToken::new();

        let started = tokio::time::Instant::now();
        let (fast, slow) = tokio::join!(
            client.generate_text("fast", &[], &cancel),
            client.generate_text("slow", &[], &cancel)
        );

        assert_eq!(fast.unwrap().text, "fast done");
        assert_eq!(slow.unwrap().text, "slow done");
        assert_eq!(attempts.lock().unwrap()["fast"], 1);
        assert_eq!(attempts.lock().unwrap()["slow"], 5);
        // 2000 + 3000 + 4500 + 6750 of backoff for the slow call only.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(16_250));
        assert!(elapsed < Duration::from_millis(16_300));
        assert!(backend.content_models().iter().all(|m| m == FLASH));
    }

    fn jpeg() -> MediaAsset {
        MediaAsset::new("image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_question_sends_inline_part_before_prompt() {
        let backend = MockBackend::new().with_content_response(
            FLASH,
            Ok(GenerateContentResponse::from_text("A cup of tea on a desk.")),
        );

        let response = client(&backend)
            .analyze_image(
                "Describe this picture in detail.",
                &jpeg(),
                Some("You are a visual analysis expert."),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.text, "A cup of tea on a desk.");

        let requests = backend.content_requests();
        let request = &requests[0];
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].role.as_deref(), Some("user"));
        assert_eq!(
            request.contents[0].parts,
            vec![
                Part::inline("image/jpeg", "/9j/4A=="),
                Part::Text {
                    text: "Describe this picture in detail.".to_string()
                },
            ]
        );
        assert_eq!(
            request.system_instruction,
            Some(Content::text(None, "You are a visual analysis expert."))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_question_keeps_attachment_on_lite_fallback() {
        let backend = MockBackend::new()
            .with_content_errors(FLASH, 5, || Error::quota("Quota exceeded"))
            .with_content_response(LITE, Ok(GenerateContentResponse::from_text("tea")));

        let response = client(&backend)
            .analyze_image("What is this?", &jpeg(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.text, "tea");
        assert_eq!(backend.content_models().last().map(String::as_str), Some(LITE));
        let requests = backend.content_requests();
        let lite = &requests[5];
        assert!(lite.tools.is_empty());
        assert!(lite.system_instruction.is_none());
        assert!(matches!(
            &lite.contents[0].parts[0],
            Part::InlineData { inline_data } if inline_data.mime_type == "image/jpeg"
        ));
    }

    #[test]
    fn test_plain_text_request_has_no_inline_parts() {
        let history = vec![Turn::user("hi")];
        let request = text_request(
            TextModel::FlashLite,
            TextInput {
                prompt: "again",
                history: &history,
                attachments: &[],
                system_instruction: None,
            },
        );
        assert_eq!(request.contents.len(), 2);
        assert!(request
            .contents
            .iter()
            .flat_map(|c| &c.parts)
            .all(|p| matches!(p, Part::Text { .. })));
    }
}
