//! Resilient client for generative text, image, video and speech APIs
//!
//! Wraps the Gemini REST API with quota-aware retry, model-tier fallback and
//! cancellation so callers see a small set of generation operations instead
//! of raw rate-limit failures.

pub mod ai;
pub mod app;
pub mod error;
pub mod models;
pub mod prompts;

pub use error::{Error, Result};
