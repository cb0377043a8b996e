use crate::ai::GenerationClient;
use crate::models::{Config, GenerationRequest, GenerationResult, ResponseFormat};
use crate::{Error, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Runs one generation request and saves whatever comes back.
pub struct App {
    client: GenerationClient,
    output_dir: PathBuf,
}

impl App {
    pub fn new(config: &Config, output_dir: PathBuf) -> Self {
        Self::with_client(GenerationClient::from_config(config), output_dir)
    }

    pub fn with_client(client: GenerationClient, output_dir: PathBuf) -> Self {
        Self { client, output_dir }
    }

    /// Generates `request` and writes the artifact, returning its path.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let session_id = Uuid::new_v4();
        info!("Starting generation session {}", session_id);

        let result = self.client.generate(request, cancel).await?;
        let (extension, bytes) = artifact(request, result)?;

        let path = self.output_dir.join(artifact_name(session_id, extension));
        fs::write(&path, &bytes)?;
        info!("Saved {} bytes at: {}", bytes.len(), path.display());
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn artifact_name(session_id: Uuid, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        Local::now().format("%Y-%m-%d"),
        session_id,
        extension
    )
}

fn artifact(request: &GenerationRequest, result: GenerationResult) -> Result<(&'static str, Vec<u8>)> {
    match result {
        GenerationResult::Text(response) => {
            println!("{}", response.text);
            for link in &response.grounding_links {
                println!("  [{}] {}", link.title, link.uri);
            }
            Ok(("json", serde_json::to_vec_pretty(&response)?))
        }
        GenerationResult::Structured(response) => {
            let text = response
                .text()
                .ok_or_else(|| Error::EmptyResponse("text".to_string()))?;
            println!("{}", text);
            let extension = match request {
                GenerationRequest::Structured {
                    format: ResponseFormat::Text,
                    ..
                } => "txt",
                _ => "json",
            };
            Ok((extension, text.into_bytes()))
        }
        GenerationResult::Image(asset) | GenerationResult::Video(asset) => {
            Ok((asset.extension(), asset.data))
        }
        GenerationResult::Speech(audio) => {
            use base64::Engine as _;
            // Raw 16-bit PCM at 24kHz, no container.
            Ok(("pcm", base64::engine::general_purpose::STANDARD.decode(audio)?))
        }
    }
}
