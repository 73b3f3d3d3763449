/// Module-processing calls to the inference server
///
/// Every call has a client-side timeout that drops (and so aborts) the in-flight
/// request, and resolves to exactly one outcome. The callback form dispatches that
/// outcome to exactly one of its success/failure handlers.
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::page::{Page, StatusVariant};
use crate::prediction::ModuleResponse;
use crate::results::display_base_results;
use crate::utils::timing::{ScopedTimer, TimingStats};

pub const PENDING_STATUS: &str = "Sending request to AI server";

/// Added on top of the client-side timeout for the HTTP client's own deadline
const TRANSPORT_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: &str, mime: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime: mime.map(str::to_string),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, String> {
        let bytes = tokio::fs::read(path).await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let file_name = path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = image::ImageFormat::from_path(path).ok().map(|f| f.to_mime_type().to_string());

        Ok(Self { file_name, mime, bytes })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartPayload {
    pub files: Vec<(String, FilePart)>,
    pub fields: Vec<(String, String)>,
}

/// Files become `image1..imageN` in the order given
pub fn build_payload(files: Vec<FilePart>, fields: Vec<(String, String)>) -> MultipartPayload {
    MultipartPayload {
        files: files.into_iter()
            .enumerate()
            .map(|(i, file)| (format!("image{}", i + 1), file))
            .collect(),
        fields,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP seam. Errors are connection-level failures only; non-2xx statuses are
/// returned as responses.
pub trait Backend: Send + Sync {
    fn post_multipart<'a>(&'a self, url: &'a str, payload: MultipartPayload) -> BoxFuture<'a, Result<RawResponse, String>>;
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse, String>>;
}

pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(transport_timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(transport_timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, String> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(RawResponse { status, body })
    }
}

impl Backend for ReqwestBackend {
    fn post_multipart<'a>(&'a self, url: &'a str, payload: MultipartPayload) -> BoxFuture<'a, Result<RawResponse, String>> {
        Box::pin(async move {
            let mut form = reqwest::multipart::Form::new();
            for (name, file) in payload.files {
                let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
                if let Some(mime) = &file.mime {
                    part = part.mime_str(mime).map_err(|e| e.to_string())?;
                }
                form = form.part(name, part);
            }
            for (key, value) in payload.fields {
                form = form.text(key, value);
            }

            let response = self.client.post(url).multipart(form).send().await.map_err(|e| e.to_string())?;
            Self::read(response).await
        })
    }

    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RawResponse, String>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
            Self::read(response).await
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Response timeout. Try increasing the timeout value")]
    Timeout,
    #[error("Request cancelled")]
    Cancelled,
    #[error("Unable to complete API call ({0})")]
    Network(String),
    #[error("Error contacting API server")]
    BadStatus(u16),
    #[error("No data was returned")]
    EmptyBody,
    #[error("Unable to process server response ({0})")]
    MalformedBody(String),
    /// The module answered with `success: false`
    #[error("Operation failed")]
    Rejected(Box<ModuleResponse>),
}

impl TransportError {
    /// Status line text, None when the response itself explains the failure
    pub fn status_message(&self) -> Option<String> {
        match self {
            TransportError::Rejected(_) => None,
            other => Some(other.to_string()),
        }
    }

    fn status_variant(&self) -> StatusVariant {
        match self {
            TransportError::Cancelled => StatusVariant::Warn,
            _ => StatusVariant::Error,
        }
    }

    /// Parsed response carried by the failure, if any
    pub fn into_data(self) -> Option<ModuleResponse> {
        match self {
            TransportError::Rejected(data) => Some(*data),
            _ => None,
        }
    }
}

pub fn interpret_response(raw: RawResponse) -> Result<ModuleResponse, TransportError> {
    if !(200..300).contains(&raw.status) {
        return Err(TransportError::BadStatus(raw.status));
    }

    let body = raw.body.trim();
    if body.is_empty() {
        return Err(TransportError::EmptyBody);
    }

    let value: Value = serde_json::from_str(body).map_err(|e| TransportError::MalformedBody(e.to_string()))?;
    if value.is_null() {
        return Err(TransportError::EmptyBody);
    }

    let data: ModuleResponse = serde_json::from_value(value).map_err(|e| TransportError::MalformedBody(e.to_string()))?;
    if data.success {
        Ok(data)
    } else {
        Err(TransportError::Rejected(Box::new(data)))
    }
}

/// Shows the pending message while alive. Dropping it clears the message, also when
/// the call's future is dropped before it completes.
struct PendingStatus<'a> {
    page: &'a Mutex<Page>,
}

impl<'a> PendingStatus<'a> {
    fn show(page: &'a Mutex<Page>) -> Self {
        page.lock().unwrap().show_log_output(PENDING_STATUS, Some(StatusVariant::Info));
        Self { page }
    }
}

impl Drop for PendingStatus<'_> {
    fn drop(&mut self) {
        if let Ok(mut page) = self.page.lock() {
            if page.status().map(|s| s.text == PENDING_STATUS).unwrap_or(false) {
                page.clear_status();
            }
        }
    }
}

pub type FailureHandler = Box<dyn FnOnce(&mut Page, Option<ModuleResponse>) + Send>;

pub struct TransportClient {
    backend: Arc<dyn Backend>,
    base_url: String,
    timeout: Duration,
    page: Arc<Mutex<Page>>,
    round_trip: Mutex<TimingStats>,
}

impl TransportClient {
    pub fn new(backend: Arc<dyn Backend>, base_url: &str, timeout: Duration, page: Arc<Mutex<Page>>) -> Self {
        Self {
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            page,
            round_trip: Mutex::new(TimingStats::new("Module call round trip")),
        }
    }

    pub fn from_config(config: &Config, page: Arc<Mutex<Page>>) -> Result<Self, String> {
        let backend = ReqwestBackend::new(config.request_timeout + TRANSPORT_TIMEOUT_MARGIN)?;
        Ok(Self::new(Arc::new(backend), &config.server_url, config.request_timeout, page))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn page(&self) -> &Arc<Mutex<Page>> {
        &self.page
    }

    pub fn average_round_trip_ms(&self) -> f64 {
        self.round_trip.lock().unwrap().average_ms()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn submit(
        &self,
        route: &str,
        operation: &str,
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
    ) -> Result<ModuleResponse, TransportError> {
        self.submit_cancellable(route, operation, files, fields, &CancellationToken::new()).await
    }

    /// `POST v1/{route}/{operation}`. The status line shows a pending message for the
    /// duration of the call, then the failure reason if there is one.
    pub async fn submit_cancellable(
        &self,
        route: &str,
        operation: &str,
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<ModuleResponse, TransportError> {
        let url = self.endpoint(&format!("v1/{}/{}", route, operation));
        let payload = build_payload(files, fields);
        debug!("POST {} ({} files, {} fields)", url, payload.files.len(), payload.fields.len());

        let pending = PendingStatus::show(&self.page);
        let timer = ScopedTimer::new(&self.round_trip);

        // Dropping the request future aborts it
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.backend.post_multipart(&url, payload)) => {
                match result {
                    Err(_) => Err(TransportError::Timeout),
                    Ok(Err(e)) => Err(TransportError::Network(e)),
                    Ok(Ok(raw)) => interpret_response(raw),
                }
            }
        };

        drop(timer);
        drop(pending);

        let mut page = self.page.lock().unwrap();
        if let Err(e) = &outcome {
            if let Some(message) = e.status_message() {
                page.show_log_output(&message, Some(e.status_variant()));
            }
        }

        outcome
    }

    /// Callback form of `submit`. Exactly one handler runs, with the page locked.
    /// Without a failure handler the baseline results display is used.
    pub async fn submit_with_callbacks<S>(
        &self,
        route: &str,
        operation: &str,
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
        on_success: S,
        on_failure: Option<FailureHandler>,
    ) where
        S: FnOnce(&mut Page, ModuleResponse),
    {
        let outcome = self.submit(route, operation, files, fields).await;
        let mut page = self.page.lock().unwrap();

        match outcome {
            Ok(data) => on_success(&mut page, data),
            Err(e) => {
                let data = e.into_data();
                match on_failure {
                    Some(handler) => handler(&mut page, data),
                    None => display_base_results(&mut page, data.as_ref()),
                }
            }
        }
    }

    /// GET a JSON document relative to the server URL, under the same timeout
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.endpoint(path);

        let raw = match tokio::time::timeout(self.timeout, self.backend.get(&url)).await {
            Err(_) => return Err(TransportError::Timeout),
            Ok(Err(e)) => {
                warn!("GET {} failed: {}", url, e);
                return Err(TransportError::Network(e));
            }
            Ok(Ok(raw)) => raw,
        };

        if !(200..300).contains(&raw.status) {
            return Err(TransportError::BadStatus(raw.status));
        }
        if raw.body.trim().is_empty() {
            return Err(TransportError::EmptyBody);
        }
        serde_json::from_str(&raw.body).map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}
