//! Request/response envelope for the grano REST API.

use std::sync::Arc;

use grano_core::{ClientConfig, FileSet, GranoError, Result, ServerFault};
use serde_json::Value;

use crate::transport::{ApiRequest, HttpTransport, Method, RawResponse, Transport};

/// Thread-safe grano API client.
///
/// Resolves endpoint paths against the configured host and prefix, sends
/// requests through a [`Transport`], and maps error responses onto
/// [`GranoError`]. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

impl Client {
    /// Create a client talking HTTP to the configured server.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client using the given transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let base_url = config.base_url();
        tracing::debug!(base_url = %base_url, "Created grano client");
        Self {
            inner: Arc::new(ClientInner {
                config,
                base_url,
                transport,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Resolve an endpoint to an absolute URL.
    ///
    /// URLs already under the API base (such as pagination links) are kept.
    pub fn path(&self, endpoint: &str) -> String {
        let base = &self.inner.base_url;
        if endpoint.starts_with(base.as_str()) {
            return endpoint.to_string();
        }
        format!("{base}{}", endpoint.trim_start_matches('/'))
    }

    /// GET an endpoint and decode its JSON body.
    pub async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<(u16, Value)> {
        let request = ApiRequest {
            method: Method::Get,
            url: self.path(endpoint),
            params: params.to_vec(),
            data: None,
            files: FileSet::new(),
        };
        self.execute(request).await
    }

    /// POST a JSON document (as the `data` form field) plus file attachments.
    pub async fn post(&self, endpoint: &str, body: &Value, files: &FileSet) -> Result<(u16, Value)> {
        let request = ApiRequest {
            method: Method::Post,
            url: self.path(endpoint),
            params: Vec::new(),
            data: Some(serde_json::to_string(body)?),
            files: files.clone(),
        };
        self.execute(request).await
    }

    async fn execute(&self, request: ApiRequest) -> Result<(u16, Value)> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.inner.transport.send(request).await?;
        tracing::debug!(?method, url = %url, status = response.status, "grano request");
        evaluate(response)
    }
}

/// Interpret a raw response.
///
/// Non-JSON bodies, 400 and 404 each map to their own error; other failures
/// with a recognizable error shape become [`GranoError::Server`]. Anything
/// else is handed back for the caller to interpret.
pub fn evaluate(response: RawResponse) -> Result<(u16, Value)> {
    let data: Value = serde_json::from_str(&response.body).map_err(|_| {
        GranoError::Transport(format!(
            "Server did not respond with JSON data (status {}).",
            response.status
        ))
    })?;

    match response.status {
        400 => Err(GranoError::Validation(ServerFault::from_body(&data))),
        404 => Err(GranoError::NotFound(ServerFault::from_body(&data))),
        status if !(200..400).contains(&status) && is_error_shape(&data) => {
            Err(GranoError::Server(ServerFault::from_body(&data)))
        }
        status => Ok((status, data)),
    }
}

/// Accept only a 2xx answer, turning anything [`evaluate`] handed back
/// into [`GranoError::Server`].
pub fn expect_success((status, data): (u16, Value)) -> Result<Value> {
    if (200..300).contains(&status) {
        return Ok(data);
    }
    let mut fault = ServerFault::from_body(&data);
    fault.status = Some(status);
    if fault.message.is_none() {
        fault.message = Some(format!("unexpected response status {status}"));
    }
    Err(GranoError::Server(fault))
}

fn is_error_shape(data: &Value) -> bool {
    data.get("status").is_some() && data.get("message").is_some()
}
