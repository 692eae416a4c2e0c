//! Upload - send a PDF to the backend and get back its document identity

use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Only PDF files can be uploaded: {0}")]
    NotPdf(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upload rejected with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Invalid upload response: {0}")]
    Decode(String),
}

/// Body of a successful `POST /api/upload`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub text_length: Option<u64>,
}

/// Error body the backend sends with a rejection
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Posts documents to `{base_url}/api/upload` as multipart `file`
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl UploadClient {
    /// Build a client whose requests give up after `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    /// Upload the file at `path`
    pub async fn upload(&self, path: &Path) -> Result<UploadResponse, UploadError> {
        let filename = pdf_file_name(path)?;
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!("Uploading {} ({} bytes)", filename, bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.detail)
                .unwrap_or(text);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Decode(e.to_string()))?;
        if body.document_id.is_empty() {
            return Err(UploadError::Decode("missing document_id".to_string()));
        }

        tracing::info!("Uploaded {} as document {}", body.filename, body.document_id);
        Ok(body)
    }
}

/// File name of `path`, which must carry a `.pdf` extension
fn pdf_file_name(path: &Path) -> Result<String, UploadError> {
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) if is_pdf => Ok(name.to_string()),
        _ => Err(UploadError::NotPdf(path.display().to_string())),
    }
}
