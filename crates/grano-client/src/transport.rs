//! Wire-level transport for grano API requests.
//!
//! [`Transport`] is the seam between the client and the network: the
//! production implementation speaks HTTP via reqwest, and
//! [`crate::test_support::MemoryServer`] answers requests in memory.

use grano_core::{ClientConfig, FileSet, GranoError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};

pub const API_KEY_HEADER: &str = "X-Grano-API-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully resolved request to the grano API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, possibly already carrying a query string.
    pub url: String,
    pub params: Vec<(String, String)>,
    /// JSON payload, sent as the `data` form field of a POST.
    pub data: Option<String>,
    /// File parts of a POST, keyed by property name.
    pub files: FileSet,
}

/// Status and undecoded body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request. Only failures to get any response are errors here;
    /// status codes are interpreted by the client.
    async fn send(&self, request: ApiRequest) -> Result<RawResponse>;
}

/// HTTP transport backed by a pooled reqwest client.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| GranoError::Config(format!("invalid API key: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| GranoError::Transport(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        let builder = match request.method {
            Method::Get => self.http.get(&request.url).query(&request.params),
            Method::Post => {
                let mut form = Form::new().text("data", request.data.unwrap_or_default());
                for (name, blob) in request.files {
                    let mime = blob.mime_type().to_string();
                    let part = Part::bytes(blob.content)
                        .file_name(blob.file_name)
                        .mime_str(&mime)
                        .map_err(|e| GranoError::Transport(e.to_string()))?;
                    form = form.part(name, part);
                }
                self.http
                    .post(&request.url)
                    .query(&request.params)
                    .multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| GranoError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GranoError::Transport(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds_with_api_key() {
        let config = ClientConfig::default().with_api_key("secret");
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[test]
    fn test_http_transport_rejects_invalid_api_key() {
        let config = ClientConfig::default().with_api_key("bad\nkey");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(GranoError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let mut config = ClientConfig::default().with_host("http://127.0.0.1:19999");
        config.timeout_secs = 1;
        let transport = HttpTransport::new(&config).unwrap();
        let result = transport
            .send(ApiRequest {
                method: Method::Get,
                url: format!("{}projects", config.base_url()),
                params: Vec::new(),
                data: None,
                files: FileSet::new(),
            })
            .await;
        assert!(matches!(result, Err(GranoError::Transport(_))));
    }
}
