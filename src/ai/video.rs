//! Long-running video generation: submit, poll until done, download.

use super::client::GenerationClient;
use super::gemini::types::{VideoGenerationRequest, VideoInstance, VideoOperation, VideoParameters};
use super::mime;
use super::retry::{self, cancellable};
use super::tiers::{ModelTier, VideoModel};
use crate::models::MediaAsset;
use crate::error::RESOURCE_EXHAUSTED;
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl GenerationClient {
    /// Submits a video job and waits for it at a fixed poll interval.
    ///
    /// Neither submission nor polling is retried. Polling stops after
    /// `video_max_polls` unfinished responses with [`Error::VideoTimeout`].
    pub async fn generate_video(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<MediaAsset> {
        self.refresh_credential()?;

        let model = VideoModel::VeoFast;
        let request = VideoGenerationRequest {
            instances: vec![VideoInstance {
                prompt: prompt.to_string(),
            }],
            parameters: VideoParameters {
                aspect_ratio: VideoModel::ASPECT_RATIO.to_string(),
                resolution: VideoModel::RESOLUTION.to_string(),
                sample_count: 1,
            },
        };

        let mut operation =
            cancellable(cancel, self.backend.start_video(model.model_id(), &request)).await?;
        info!("Video job {} submitted to {}", operation.name, model.model_id());

        let mut polls = 0;
        while !operation.done {
            if polls >= self.options.video_max_polls {
                return Err(Error::VideoTimeout { polls });
            }
            retry::sleep(cancel, self.options.video_poll_interval).await?;
            operation = cancellable(cancel, self.backend.poll_operation(&operation)).await?;
            polls += 1;
            debug!("Video job {} poll {}: done={}", operation.name, polls, operation.done);
        }

        let uri = finished_video_uri(&operation)?;
        let bytes = cancellable(cancel, self.backend.download(uri)).await?;
        let mime_type = mime::detect_media_mime(&bytes).to_string();
        info!(
            "Video job {} finished after {} polls ({} bytes)",
            operation.name,
            polls,
            bytes.len()
        );
        Ok(MediaAsset::new(mime_type, bytes))
    }
}

/// Numeric form of `RESOURCE_EXHAUSTED` inside long-running operation errors.
const GRPC_RESOURCE_EXHAUSTED: i32 = 8;

fn finished_video_uri(operation: &VideoOperation) -> Result<&str> {
    if let Some(error) = &operation.error {
        return Err(Error::Backend {
            status: None,
            code: error.code.map(|code| match code {
                GRPC_RESOURCE_EXHAUSTED => RESOURCE_EXHAUSTED.to_string(),
                other => other.to_string(),
            }),
            message: error.message.clone(),
        });
    }
    operation
        .video_uri()
        .ok_or_else(|| Error::EmptyResponse("video".to_string()))
}
