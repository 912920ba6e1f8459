//! JSON-over-HTTP transport used by handlers.
//!
//! Wraps an [`HttpClient`] with a base URL and serde encoding. Non-2xx
//! responses come back as [`RemoteError::Http`] carrying the body, ready
//! for [`EntityHandler::classify`](crate::EntityHandler::classify).

use crate::transport::{HttpBody, HttpClient, HttpMethod, HttpRequest, MultipartPart, RemoteError};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Form field holding the JSON payload of a multipart request.
pub const MULTIPART_DATA_FIELD: &str = "data";

/// HTTP transport for one API.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL (e.g. "https://api.example.com/v1").
    base_url: String,
    client: C,
    /// Last failure, for diagnostics screens.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last failure message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// POSTs a JSON body and decodes the JSON response.
    pub fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> Result<Res, RemoteError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = encode(request)?;
        self.call(HttpMethod::Post, endpoint, HttpBody::Json(body))
    }

    /// PUTs a JSON body and decodes the JSON response.
    pub fn put_json<Req, Res>(&self, endpoint: &str, request: &Req) -> Result<Res, RemoteError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = encode(request)?;
        self.call(HttpMethod::Put, endpoint, HttpBody::Json(body))
    }

    /// Sends a DELETE and decodes the JSON response (`()` for none).
    pub fn delete<Res>(&self, endpoint: &str) -> Result<Res, RemoteError>
    where
        Res: DeserializeOwned,
    {
        self.call(HttpMethod::Delete, endpoint, HttpBody::Empty)
    }

    /// POSTs a multipart form: the JSON payload as the `data` field,
    /// followed by the attachments.
    pub fn post_multipart<Req, Res>(
        &self,
        endpoint: &str,
        request: &Req,
        attachments: Vec<MultipartPart>,
    ) -> Result<Res, RemoteError>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let json = encode(request)?;
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        parts.push(MultipartPart {
            name: MULTIPART_DATA_FIELD.into(),
            file_name: None,
            content_type: "application/json".into(),
            data: json,
        });
        parts.extend(attachments);
        self.call(HttpMethod::Post, endpoint, HttpBody::Multipart(parts))
    }

    fn call<Res>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: HttpBody,
    ) -> Result<Res, RemoteError>
    where
        Res: DeserializeOwned,
    {
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, endpoint),
            body,
        };

        let response = self.client.send(&request).map_err(|e| self.fail(e))?;

        if !response.is_success() {
            let text = response.text();
            let body = (!text.trim().is_empty()).then_some(text);
            tracing::debug!(url = %request.url, status = response.status, "request rejected");
            return Err(self.fail(RemoteError::Http {
                status: response.status,
                body,
            }));
        }

        let bytes: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body
        };
        let decoded = serde_json::from_slice(bytes).map_err(|e| {
            self.fail(RemoteError::Other(format!("could not decode response: {e}")))
        })?;

        *self.last_error.write() = None;
        Ok(decoded)
    }

    fn fail(&self, error: RemoteError) -> RemoteError {
        *self.last_error.write() = Some(error.to_string());
        error
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(value)
        .map_err(|e| RemoteError::Other(format!("could not encode request: {e}")))
}
