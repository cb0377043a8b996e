//! Single-tier image and speech generation.

use super::client::GenerationClient;
use super::gemini::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ImageConfig,
    SpeechConfig,
};
use super::mime;
use super::retry::with_quota_retry;
use super::tiers::{ImageModel, ModelTier, SpeechModel};
use crate::models::{AspectRatio, MediaAsset};
use crate::{prompts, Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl GenerationClient {
    /// Generates one image and returns it decoded.
    ///
    /// A response without any inline image part fails with
    /// [`Error::NoImagePart`], which is never retried.
    pub async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        cancel: &CancellationToken,
    ) -> Result<MediaAsset> {
        self.refresh_credential()?;

        let model = ImageModel::FlashImage;
        let request = GenerateContentRequest {
            contents: vec![Content::text(None, prompt)],
            generation_config: Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.as_str().to_string(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let backend = &self.backend;
        let request = &request;
        with_quota_retry(&self.options.retry, cancel, || async move {
            let response = backend.generate_content(model.model_id(), request).await?;
            decode_image(&response)
        })
        .await
    }

    /// Synthesizes `text` with a prebuilt voice.
    ///
    /// Returns the base64 audio payload untouched; decoding and playback are
    /// up to the caller.
    pub async fn generate_speech(
        &self,
        text: &str,
        voice: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.refresh_credential()?;

        let model = SpeechModel::FlashTts;
        let voice = if voice.trim().is_empty() {
            SpeechModel::DEFAULT_VOICE
        } else {
            voice
        };
        let request = GenerateContentRequest {
            contents: vec![Content::text(
                None,
                prompts::render(prompts::SPEECH, &[("text", text)]),
            )],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::prebuilt(voice)),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = with_quota_retry(&self.options.retry, cancel, || {
            self.backend.generate_content(model.model_id(), &request)
        })
        .await?;

        let audio = response
            .first_inline_data()
            .map(|inline| inline.data.clone())
            .ok_or_else(|| Error::EmptyResponse("audio".to_string()))?;
        info!("Synthesized speech with voice {} ({} base64 chars)", voice, audio.len());
        Ok(audio)
    }
}

fn decode_image(response: &GenerateContentResponse) -> Result<MediaAsset> {
    let inline = response.first_inline_data().ok_or(Error::NoImagePart)?;

    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD.decode(&inline.data)?;
    let mime_type = mime::resolve_mime(&inline.mime_type, &bytes);
    debug!("Image part decoded: {} bytes of {}", bytes.len(), mime_type);
    Ok(MediaAsset::new(mime_type, bytes))
}
