//! Stateless pass-through to the analysis backend.
//!
//! These routes keep nothing: they read the multipart upload, forward it,
//! and hand the backend's JSON straight back. Caching and run linkage are
//! the caller's job (see `workflow`).

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::models::DocumentUpload;
use crate::state::AppState;

/// Fields of an upload form. Unknown fields are ignored.
#[derive(Debug, Default)]
struct UploadForm {
    document: Option<DocumentUpload>,
    use_job_description: bool,
    job_description: Option<String>,
    target_role: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("malformed form data: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or("resume").to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("unreadable file: {e}")))?;
                    form.document = Some(DocumentUpload::new(file_name, bytes));
                }
                "use_job_description" => {
                    form.use_job_description = text(field).await? == "true";
                }
                "job_description" => form.job_description = Some(text(field).await?),
                "target_role" => form.target_role = Some(text(field).await?),
                _ => {}
            }
        }
        Ok(form)
    }

    fn document(&mut self) -> Result<DocumentUpload, AppError> {
        self.document
            .take()
            .filter(|d| !d.bytes.is_empty())
            .ok_or_else(|| AppError::Validation("a resume file is required".to_string()))
    }

    /// The job description is only forwarded when the user opted in.
    fn job_description(&self) -> Option<&str> {
        if !self.use_job_description {
            return None;
        }
        self.job_description
            .as_deref()
            .map(str::trim)
            .filter(|jd| !jd.is_empty())
    }
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("unreadable form field: {e}")))
}

/// POST /api/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let document = form.document()?;
    let job_description = form.job_description();
    info!(
        "Forwarding analysis of '{}' ({} bytes, job description: {})",
        document.file_name,
        document.bytes.len(),
        job_description.is_some()
    );
    let payload = state.backend.analyze(&document, job_description).await?;
    Ok(Json(payload))
}

/// POST /api/rewrite
pub async fn handle_rewrite(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut form = UploadForm::read(multipart).await?;
    let document = form.document()?;
    let target_role = form
        .target_role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| AppError::Validation("target_role is required".to_string()))?;
    info!("Forwarding rewrite of '{}' for '{target_role}'", document.file_name);
    let payload = state.backend.rewrite(&document, target_role).await?;
    Ok(Json(payload))
}
