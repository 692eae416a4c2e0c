//! Integration tests for document upload

use pdfpal::config::Config;
use pdfpal::upload::UploadError;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.server.base_url = server.uri();
    config
}

fn write_pdf(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();
    path
}

#[tokio::test]
async fn test_upload_returns_document_identity() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .and(header("authorization", "Bearer dev-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document_id": "8f14e45f",
            "filename": "report.pdf",
            "status": "processed",
            "page_count": 12,
            "text_length": 40210
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploaded = config_for(&server)
        .upload_client()?
        .upload(&write_pdf(&dir, "report.pdf"))
        .await?;

    assert_eq!(uploaded.document_id, "8f14e45f");
    assert_eq!(uploaded.filename, "report.pdf");
    assert_eq!(uploaded.page_count, Some(12));

    let requests = server.received_requests().await.unwrap_or_default();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains(r#"name="file""#));
    assert!(body.contains(r#"filename="report.pdf""#));
    Ok(())
}

#[tokio::test]
async fn test_rejection_carries_server_detail() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Only PDF files are allowed"})),
        )
        .mount(&server)
        .await;

    let result = config_for(&server)
        .upload_client()?
        .upload(&write_pdf(&dir, "scan.pdf"))
        .await;

    match result {
        Err(UploadError::Rejected { status, detail }) => {
            assert_eq!(status, 400);
            assert_eq!(detail, "Only PDF files are allowed");
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_response_without_document_id_is_invalid() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;

    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"filename": "a.pdf"})))
        .mount(&server)
        .await;

    let result = config_for(&server)
        .upload_client()?
        .upload(&write_pdf(&dir, "a.pdf"))
        .await;

    assert!(matches!(result, Err(UploadError::Decode(_))));
    Ok(())
}

#[tokio::test]
async fn test_non_pdf_is_rejected_locally() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir()?;
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "plain text")?;

    let client = config_for(&server).upload_client()?;
    assert!(matches!(
        client.upload(&notes).await,
        Err(UploadError::NotPdf(_))
    ));
    assert!(matches!(
        client.upload(&dir.path().join("missing.pdf")).await,
        Err(UploadError::Read { .. })
    ));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
    Ok(())
}
