//! HTTP client for the ingest backend's REST interface.
//!
//! Wire contract:
//! - `POST {base}/upload` — multipart with a single `file` part, response
//!   `{status, message, track_id}`.
//! - `GET {base}/documents?page=N&page_size=M` — response
//!   `{documents: [...], total}`; pages are fetched until a short page.
//! - `DELETE {base}/delete_document` — body `{"doc_ids": [id]}`, response
//!   `{status, message}`; `status == "busy"` is the retriable condition.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::IngestBackend;
use crate::error::{ErrorKind, Result};
use crate::models::DocumentInfo;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<DocumentInfo>,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    doc_ids: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Ingest backend speaking the REST wire contract over reqwest.
///
/// # Examples
///
/// ```no_run
/// use docsink_backend::backend::HttpIngestBackend;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = HttpIngestBackend::new(
///     "ingest",
///     "https://rag.internal/api",
///     None,
///     Duration::from_secs(30),
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct HttpIngestBackend {
    name: String,
    client: Client,
    base_url: String,
    api_token: Option<String>,
    page_size: usize,
}

impl HttpIngestBackend {
    /// Create a new client for the given base URL.
    ///
    /// `timeout` applies per request. A trailing slash on `base_url` is
    /// tolerated.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the listing page size (mostly for tests).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}/{endpoint}", self.base_url));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn list_page(&self, page: usize) -> Result<ListResponse> {
        let response = self
            .request(Method::GET, "documents")
            .query(&[("page", page.to_string()), ("page_size", self.page_size.to_string())])
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        if !response.status().is_success() {
            exn::bail!(ErrorKind::Rejected(format!("list returned HTTP {}", response.status())));
        }
        Ok(response
            .json::<ListResponse>()
            .await
            .map_err(|e| ErrorKind::Protocol(e.to_string()))?)
    }
}

#[async_trait]
impl IngestBackend for HttpIngestBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, path: &Path) -> Result<Option<String>> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Protocol(format!("upload path has no file name: {}", path.display()))))?;
        let bytes = tokio::fs::read(path).await.map_err(ErrorKind::Io)?;
        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| ErrorKind::Protocol(e.to_string()))?;
        let response = self
            .request(Method::POST, "upload")
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        if !response.status().is_success() {
            exn::bail!(ErrorKind::Rejected(format!(
                "upload of {file_name} returned HTTP {}",
                response.status()
            )));
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ErrorKind::Protocol(e.to_string()))?;
        if let Some(status) = body.status.as_deref()
            && status.eq_ignore_ascii_case("error")
        {
            exn::bail!(ErrorKind::Rejected(body.message.unwrap_or_else(|| "upload rejected".to_string())));
        }
        Ok(body.track_id.filter(|id| !id.is_empty()))
    }

    async fn list(&self) -> Result<Vec<DocumentInfo>> {
        let mut documents = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.list_page(page).await?;
            let count = batch.documents.len();
            documents.extend(batch.documents.into_iter().map(DocumentInfo::normalize));
            // A short page means we've drained the listing; the total hint
            // (when present) lets us stop one request earlier.
            if count < self.page_size {
                break;
            }
            if let Some(total) = batch.total
                && documents.len() as u64 >= total
            {
                break;
            }
            page += 1;
        }
        tracing::trace!(backend = %self.name, documents = documents.len(), pages = page, "Listed backend documents");
        Ok(documents)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, "delete_document")
            .json(&DeleteRequest { doc_ids: [doc_id] })
            .send()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorKind::Network(e.to_string()))?;
        let parsed: Option<DeleteResponse> = serde_json::from_str(&body).ok();
        if let Some(parsed) = &parsed
            && parsed.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("busy"))
        {
            exn::bail!(ErrorKind::Busy);
        }
        if !http_status.is_success() {
            exn::bail!(ErrorKind::Rejected(format!("delete of {doc_id} returned HTTP {http_status}")));
        }
        if let Some(parsed) = parsed
            && parsed.status.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("error"))
        {
            exn::bail!(ErrorKind::Rejected(parsed.message.unwrap_or_else(|| "delete rejected".to_string())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend_for(server: &MockServer) -> HttpIngestBackend {
        HttpIngestBackend::new("test", server.uri(), None, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_track_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "message": "accepted", "track_id": "T42"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"content").unwrap();

        let track = backend_for(&server).await.upload(&file).await.unwrap();
        assert_eq!(track.as_deref(), Some("T42"));
    }

    #[tokio::test]
    async fn test_upload_without_track_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "message": "accepted"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"content").unwrap();

        let track = backend_for(&server).await.upload(&file).await.unwrap();
        assert_eq!(track, None);
    }

    #[tokio::test]
    async fn test_upload_http_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"content").unwrap();

        let err = backend_for(&server).await.upload(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rejected(_)));
    }

    #[tokio::test]
    async fn test_list_paginates_and_lowercases() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documents": [
                    {"id": "D1", "status": "Processed"},
                    {"id": "D2", "status": "FAILED"}
                ],
                "total": 3
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/documents"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documents": [{"id": "D3", "status": "processing"}],
                "total": 3
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await.with_page_size(2);
        let docs = backend.list().await.unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].status.as_deref(), Some("processed"));
        assert_eq!(docs[1].status.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_delete_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/delete_document"))
            .and(body_json(serde_json::json!({"doc_ids": ["D1"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok", "message": "deleted"
            })))
            .mount(&server)
            .await;

        backend_for(&server).await.delete("D1").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_busy_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/delete_document"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "busy", "message": "documents are processing"
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server).await.delete("D1").await.unwrap_err();
        assert!((*err).is_busy());
    }

    #[tokio::test]
    async fn test_delete_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/delete_document"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error", "message": "no such document"
            })))
            .mount(&server)
            .await;

        let err = backend_for(&server).await.delete("D1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Rejected(_)));
    }
}
