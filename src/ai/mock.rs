use super::gemini::types::{
    GenerateContentRequest, GenerateContentResponse, VideoGenerationRequest, VideoOperation,
};
use super::GenerativeBackend;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

type ContentHandler =
    dyn Fn(&str, &GenerateContentRequest) -> Result<GenerateContentResponse> + Send + Sync;

/// A backend call as the mock saw it.
#[derive(Debug, Clone)]
pub enum RecordedCall {
    GenerateContent {
        model: String,
        request: GenerateContentRequest,
        at: Instant,
    },
    StartVideo {
        model: String,
        request: VideoGenerationRequest,
    },
    PollOperation {
        name: String,
        at: Instant,
    },
    Download {
        uri: String,
    },
}

/// Scripted [`GenerativeBackend`] for tests and offline harnesses.
///
/// `generate_content` answers from the per-model queue first, then from the
/// handler. Video calls answer from the operation queue: the first entry is
/// returned by `start_video`, the rest by successive polls.
#[derive(Clone, Default)]
pub struct MockBackend {
    content_responses: Arc<Mutex<HashMap<String, VecDeque<Result<GenerateContentResponse>>>>>,
    content_handler: Option<Arc<ContentHandler>>,
    operations: Arc<Mutex<VecDeque<Result<VideoOperation>>>>,
    downloads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    refresh_count: Arc<Mutex<usize>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_response(
        self,
        model: &str,
        response: Result<GenerateContentResponse>,
    ) -> Self {
        self.content_responses
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Queues the same failure `times` times for `model`.
    pub fn with_content_errors<F>(self, model: &str, times: usize, make_error: F) -> Self
    where
        F: Fn() -> Error,
    {
        (0..times).fold(self, |mock, _| {
            mock.with_content_response(model, Err(make_error()))
        })
    }

    pub fn with_content_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &GenerateContentRequest) -> Result<GenerateContentResponse>
            + Send
            + Sync
            + 'static,
    {
        self.content_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_operation(self, operation: Result<VideoOperation>) -> Self {
        self.operations.lock().unwrap().push_back(operation);
        self
    }

    pub fn with_download(self, uri: &str, bytes: Vec<u8>) -> Self {
        self.downloads
            .lock()
            .unwrap()
            .insert(uri.to_string(), bytes);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Models addressed by `generate_content`, in call order.
    pub fn content_models(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::GenerateContent { model, .. } => Some(model),
                _ => None,
            })
            .collect()
    }

    pub fn content_requests(&self) -> Vec<GenerateContentRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::GenerateContent { request, .. } => Some(request),
                _ => None,
            })
            .collect()
    }

    /// When each `generate_content` call for `model` arrived.
    pub fn content_call_times(&self, model: &str) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::GenerateContent { model: m, at, .. } if m == model => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::PollOperation { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn credential_refreshes(&self) -> usize {
        *self.refresh_count.lock().unwrap()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_operation(&self) -> Result<VideoOperation> {
        self.operations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Generic("No scripted video operation".to_string())))
    }
}

#[async_trait]
impl GenerativeBackend for MockBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.record(RecordedCall::GenerateContent {
            model: model.to_string(),
            request: request.clone(),
            at: Instant::now(),
        });

        let scripted = self
            .content_responses
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front);

        match (scripted, &self.content_handler) {
            (Some(response), _) => response,
            (None, Some(handler)) => handler(model, request),
            (None, None) => Err(Error::Generic(format!(
                "No scripted response for model {}",
                model
            ))),
        }
    }

    async fn start_video(
        &self,
        model: &str,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation> {
        self.record(RecordedCall::StartVideo {
            model: model.to_string(),
            request: request.clone(),
        });
        self.next_operation()
    }

    async fn poll_operation(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        self.record(RecordedCall::PollOperation {
            name: operation.name.clone(),
            at: Instant::now(),
        });
        self.next_operation()
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        self.record(RecordedCall::Download {
            uri: uri.to_string(),
        });
        self.downloads
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::Backend {
                status: Some(404),
                code: Some("NOT_FOUND".to_string()),
                message: format!("No scripted download for {}", uri),
            })
    }

    fn refresh_credential(&self) -> Result<()> {
        *self.refresh_count.lock().unwrap() += 1;
        Ok(())
    }
}
