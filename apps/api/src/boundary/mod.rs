/// Boundary to the analysis/rewrite backend.
///
/// The backend owns text extraction and all AI calls. From this side of the
/// boundary a request is a document plus optional context text, and a
/// response is opaque JSON. "A JSON object came back" is success; nothing
/// about its shape is validated here.
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::BoundaryError;
use crate::models::DocumentUpload;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// The two calls the pipeline makes across the boundary.
/// Implement this to swap the backend (or fake it in tests).
#[async_trait]
pub trait AnalysisBoundary: Send + Sync {
    /// Analyze a résumé, optionally against a job description.
    async fn analyze(
        &self,
        document: &DocumentUpload,
        job_description: Option<&str>,
    ) -> Result<Value, BoundaryError>;

    /// Rewrite a résumé for a target role.
    async fn rewrite(
        &self,
        document: &DocumentUpload,
        target_role: &str,
    ) -> Result<Value, BoundaryError>;
}

/// HTTP client for the backend's `/api/analyze` and `/api/rewrite` endpoints.
/// Retries on transport errors, 429 and 5xx with exponential backoff.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BoundaryError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Posts a multipart form built fresh for every attempt.
    async fn post_form<F>(&self, path: &str, build: F) -> Result<Value, BoundaryError>
    where
        F: Fn() -> Form + Send + Sync,
    {
        let url = self.endpoint(path);
        let mut last_error: Option<BoundaryError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Backend call to {path} attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).multipart(build()).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(BoundaryError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Backend {path} returned {}: {}", status, body);
                last_error = Some(BoundaryError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BoundaryError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let body = response.bytes().await?;
            let value = interpret_body(&body)?;
            debug!("Backend {path} succeeded ({} bytes)", body.len());
            return Ok(value);
        }

        Err(last_error.unwrap_or(BoundaryError::EmptyResponse))
    }
}

/// Turns a 2xx body into a payload. The backend signals AI failures with a
/// 200 and `{"error": "..."}`, which must not be cached as a result.
fn interpret_body(body: &[u8]) -> Result<Value, BoundaryError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BoundaryError::EmptyResponse);
    }
    let value: Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Err(BoundaryError::EmptyResponse);
    }
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(BoundaryError::Rejected(message.to_string()));
    }
    Ok(value)
}

fn file_part(document: &DocumentUpload) -> Part {
    Part::bytes(document.bytes.to_vec()).file_name(document.file_name.clone())
}

/// Form fields for an analysis request. The job description is only sent
/// when one was actually provided.
pub fn analyze_form(document: &DocumentUpload, job_description: Option<&str>) -> Form {
    let job_description = job_description.map(str::trim).filter(|jd| !jd.is_empty());
    let form = Form::new()
        .part("file", file_part(document))
        .text("use_job_description", job_description.is_some().to_string());
    match job_description {
        Some(jd) => form.text("job_description", jd.to_string()),
        None => form,
    }
}

pub fn rewrite_form(document: &DocumentUpload, target_role: &str) -> Form {
    Form::new()
        .part("file", file_part(document))
        .text("target_role", target_role.to_string())
}

#[async_trait]
impl AnalysisBoundary for BackendClient {
    async fn analyze(
        &self,
        document: &DocumentUpload,
        job_description: Option<&str>,
    ) -> Result<Value, BoundaryError> {
        self.post_form("analyze", || analyze_form(document, job_description))
            .await
    }

    async fn rewrite(
        &self,
        document: &DocumentUpload,
        target_role: &str,
    ) -> Result<Value, BoundaryError> {
        self.post_form("rewrite", || rewrite_form(document, target_role))
            .await
    }
}
