use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nexus_genai::app::App;
use nexus_genai::ai::mime;
use nexus_genai::models::{AspectRatio, Config, GenerationRequest, MediaAsset, ResponseFormat};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nexus-genai")]
#[command(about = "Generate text, images, video and speech with quota-aware fallback")]
struct CliArgs {
    /// Directory generated artifacts are written to.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Grounded chat answer.
    Text { prompt: String },
    /// Reasoning-heavy task on the pro → flash → lite cascade.
    Complex {
        prompt: String,
        #[arg(long)]
        system: Option<String>,
        /// Ask for a JSON response.
        #[arg(long)]
        json: bool,
    },
    /// Question about a local image file.
    Vision {
        image: PathBuf,
        #[arg(default_value = "Describe what you see in this image in detail.")]
        prompt: String,
        #[arg(long)]
        system: Option<String>,
    },
    Image {
        prompt: String,
        #[arg(long, default_value = "1:1", value_parser = parse_aspect_ratio)]
        aspect_ratio: AspectRatio,
    },
    Video { prompt: String },
    Speech {
        text: String,
        #[arg(long, default_value = "Kore")]
        voice: String,
    },
}

/// User-facing line for an error that escaped retry and fallback.
fn failure_notice(err: &nexus_genai::Error) -> String {
    let notice = err.user_notice();
    format!(
        "{} (notice shown for {}s)",
        notice.message(),
        notice.display_for().as_secs()
    )
}

fn parse_aspect_ratio(input: &str) -> std::result::Result<AspectRatio, String> {
    input.parse().map_err(|e: nexus_genai::Error| e.to_string())
}

impl Command {
    fn into_request(self) -> Result<GenerationRequest> {
        let request = match self {
            Command::Text { prompt } => GenerationRequest::Text {
                prompt,
                history: Vec::new(),
            },
            Command::Complex {
                prompt,
                system,
                json,
            } => GenerationRequest::Structured {
                prompt,
                system_instruction: system,
                format: if json {
                    ResponseFormat::Json
                } else {
                    ResponseFormat::Text
                },
            },
            Command::Vision {
                image,
                prompt,
                system,
            } => {
                let bytes = std::fs::read(&image)
                    .with_context(|| format!("Failed to read image {}", image.display()))?;
                GenerationRequest::Vision {
                    prompt,
                    image: MediaAsset::new(mime::detect_media_mime(&bytes), bytes),
                    system_instruction: system,
                }
            }
            Command::Image {
                prompt,
                aspect_ratio,
            } => GenerationRequest::Image {
                prompt,
                aspect_ratio,
            },
            Command::Video { prompt } => GenerationRequest::Video { prompt },
            Command::Speech { text, voice } => GenerationRequest::Speech { text, voice },
        };
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_genai=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting nexus-genai");

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight generation");
            on_interrupt.cancel();
        }
    });

    let request = match args.command.into_request() {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid request: {:#}", e);
            std::process::exit(1);
        }
    };

    let app = App::new(&config, args.output_dir);
    match app.run(&request, &cancel).await {
        Ok(path) => {
            info!("Generation completed successfully: {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("Generation failed: {}", e);
            error!("{}", failure_notice(&e));
            std::process::exit(1);
        }
    }
}
