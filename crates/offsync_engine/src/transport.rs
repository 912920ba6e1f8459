//! Transport layer abstraction for remote calls.
//!
//! The engine never talks to the network itself. Handlers call the server
//! through an [`HttpClient`], and whatever goes wrong comes back as a
//! [`RemoteError`] for the classifier to interpret.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A failed remote call, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request timed out.
    Timeout(String),
    /// DNS resolution failed.
    UnresolvedHost(String),
    /// Connection-level I/O failure.
    Io(String),
    /// The server answered with a non-success status.
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: Option<String>,
    },
    /// Anything the transport could not categorize.
    Other(String),
}

impl RemoteError {
    /// Creates an HTTP error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        RemoteError::Http {
            status,
            body: Some(body.into()),
        }
    }

    /// Returns the HTTP status, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Timeout(msg) => write!(f, "timeout: {msg}"),
            RemoteError::UnresolvedHost(host) => write!(f, "unresolved host: {host}"),
            RemoteError::Io(msg) => write!(f, "I/O error: {msg}"),
            RemoteError::Http { status, .. } => write!(f, "HTTP {status}"),
            RemoteError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for RemoteError {}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    /// Form field name.
    pub name: String,
    /// File name, for file parts.
    pub file_name: Option<String>,
    /// Content type of the part.
    pub content_type: String,
    /// Part payload.
    pub data: Vec<u8>,
}

impl MultipartPart {
    /// Creates a plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: "text/plain".into(),
            data: value.into().into_bytes(),
        }
    }

    /// Creates a file field.
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: content_type.into(),
            data,
        }
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    /// No body.
    Empty,
    /// Serialized JSON.
    Json(Vec<u8>),
    /// Multipart form (JSON fields plus attachments).
    Multipart(Vec<MultipartPart>),
}

/// A request handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Body.
    pub body: HttpBody,
}

/// A response from the client, any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implement this trait over the HTTP library of the host application.
/// `Err` means the exchange itself failed (timeout, DNS, socket);
/// any response that arrived, whatever its status, is `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RemoteError>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RemoteError> {
        (**self).send(request)
    }
}

/// A scripted client for testing.
///
/// Replies are consumed in order; the last one repeats once the script
/// runs out. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    replies: Mutex<VecDeque<Result<HttpResponse, RemoteError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reply to the script.
    pub fn push_reply(&self, reply: Result<HttpResponse, RemoteError>) {
        self.replies.lock().push_back(reply);
    }

    /// Returns the requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RemoteError> {
        self.requests.lock().push(request.clone());
        let mut replies = self.replies.lock();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply.unwrap_or_else(|| Err(RemoteError::Other("no mock reply set".into())))
    }
}
