// ==============================================================================
// annotation.rs - Gene Annotation Service Client
// ==============================================================================
// Description: Resolves a variant locus to a gene name via a remote service
// Author: Matt Barham
// Created: 2025-11-21
// Modified: 2025-12-04
// Version: 1.1.0
// ==============================================================================
// Protocol:
//   POST <API_URL>
//   {"chr":"chr1","pos":100,"ref":"A","alt":"G","reference_version":"hg19"}
//   -> 200 {"gene":"BRCA2", ...}      (gene may be absent or null)
// ==============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::VariantLocus;

/// Annotation failures (local: the record gets an empty gene name)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("Annotation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Bad response from annotation service: {0}")]
    BadResponse(String),
}

/// Resolves a locus to a gene name
///
/// Implementations may block on the network; callers go through
/// [`crate::cache::AnnotationCache::resolve`] so each uncached locus is
/// requested at most once per run.
#[async_trait]
pub trait GeneAnnotator: Send + Sync {
    async fn resolve(&self, locus: &VariantLocus) -> Result<String, AnnotationError>;
}

#[derive(Debug, Deserialize)]
struct GeneResponse {
    #[serde(default)]
    gene: Option<String>,
}

/// HTTP/JSON annotation client
pub struct HttpAnnotator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnnotator {
    /// Create a client whose requests time out after `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl GeneAnnotator for HttpAnnotator {
    async fn resolve(&self, locus: &VariantLocus) -> Result<String, AnnotationError> {
        debug!(
            "Requesting gene for {}:{} {}>{}",
            locus.chromosome, locus.position, locus.reference, locus.alternate
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(locus)
            .send()
            .await
            .map_err(|e| AnnotationError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AnnotationError::ServiceUnavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(AnnotationError::BadResponse(format!("HTTP {}", status)));
        }

        let body: GeneResponse = response
            .json()
            .await
            .map_err(|e| AnnotationError::BadResponse(e.to_string()))?;

        Ok(body.gene.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP response and hand back the request body
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/gene", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            let body_start = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&request[..body_start]).to_lowercase();
            let content_length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            while request.len() < body_start + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8(request[body_start..].to_vec()).unwrap()
        });

        (url, handle)
    }

    fn locus() -> VariantLocus {
        VariantLocus::new("chr1", 100, "A", "G", "hg19")
    }

    #[tokio::test]
    async fn test_resolves_gene() {
        let (url, server) = serve_once("200 OK", r#"{"gene":"BRCA2","score":1}"#).await;
        let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();

        assert_eq!(annotator.resolve(&locus()).await.unwrap(), "BRCA2");

        let request_body = server.await.unwrap();
        let sent: VariantLocus = serde_json::from_str(&request_body).unwrap();
        assert_eq!(sent, locus());
        // same object as the cache key, field for field
        let key: serde_json::Value = serde_json::from_str(&locus().cache_key()).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&request_body).unwrap(), key);
    }

    #[tokio::test]
    async fn test_missing_or_null_gene_is_empty() {
        for body in [r#"{}"#, r#"{"gene":null}"#] {
            let (url, server) = serve_once("200 OK", body).await;
            let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();

            assert_eq!(annotator.resolve(&locus()).await.unwrap(), "");
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let (url, server) = serve_once("503 Service Unavailable", "{}").await;
        let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            annotator.resolve(&locus()).await,
            Err(AnnotationError::ServiceUnavailable(_))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_error_and_garbage_are_bad_responses() {
        let (url, server) = serve_once("404 Not Found", "{}").await;
        let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            annotator.resolve(&locus()).await,
            Err(AnnotationError::BadResponse(_))
        ));
        server.await.unwrap();

        let (url, server) = serve_once("200 OK", "not json").await;
        let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            annotator.resolve(&locus()).await,
            Err(AnnotationError::BadResponse(_))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/gene", listener.local_addr().unwrap());
        drop(listener);

        let annotator = HttpAnnotator::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            annotator.resolve(&locus()).await,
            Err(AnnotationError::ServiceUnavailable(_))
        ));
    }
}
