//! Classification of remote failures into the sync outcome taxonomy.
//!
//! This is the only place that looks at raw transport errors and HTTP
//! status codes. Everything above it works with [`SyncOutcome`].

use crate::config::SyncConfig;
use crate::transport::RemoteError;
use offsync_protocol::{
    error_codes, Conflict, ConflictType, PermanentError, RetryableError, SyncOutcome,
};

/// Resolves the conflict type of a response body.
///
/// Returning `None` falls back to the default keyword heuristic.
pub trait ConflictDetector {
    /// Inspects a conflict response body.
    fn detect(&self, body: &str) -> Option<ConflictType>;
}

impl<F> ConflictDetector for F
where
    F: Fn(&str) -> Option<ConflictType>,
{
    fn detect(&self, body: &str) -> Option<ConflictType> {
        self(body)
    }
}

/// Keywords per conflict type, checked in this order.
const CONFLICT_KEYWORDS: &[(ConflictType, &[&str])] = &[
    (
        ConflictType::InsufficientStock,
        &["stock", "insufficient", "insuficiente", "existencia"],
    ),
    (
        ConflictType::Duplicate,
        &["duplicate", "duplicado", "already exists", "ya existe"],
    ),
    (
        ConflictType::NotFound,
        &["not found", "no encontrado", "no existe"],
    ),
    (
        ConflictType::ConcurrentModification,
        &["concurrent", "modified", "modificado", "version"],
    ),
];

/// Body fields that may carry a human-readable message.
const MESSAGE_FIELDS: &[&str] = &["error", "message", "mensaje"];

/// Classifies a failed remote call.
///
/// Never panics and always yields `Retryable`, `Permanent` or `Conflict`.
pub fn classify<R>(
    error: &RemoteError,
    config: &SyncConfig,
    detector: Option<&dyn ConflictDetector>,
) -> SyncOutcome<R> {
    match error {
        RemoteError::Timeout(detail) => SyncOutcome::Retryable(
            RetryableError::new("request timed out, will retry").with_cause(detail.clone()),
        ),
        RemoteError::UnresolvedHost(host) => SyncOutcome::Retryable(
            RetryableError::new(format!("cannot reach server ({host}), no connectivity"))
                .with_cause(error.to_string()),
        ),
        RemoteError::Io(detail) => SyncOutcome::Retryable(
            RetryableError::new(format!("network error: {detail}")).with_cause(detail.clone()),
        ),
        RemoteError::Http { status, body } => {
            classify_http(*status, body.as_deref().unwrap_or(""), config, detector)
        }
        RemoteError::Other(message) => {
            let message = if message.trim().is_empty() {
                "unknown error".to_string()
            } else {
                message.clone()
            };
            SyncOutcome::Retryable(RetryableError::new(message))
        }
    }
}

/// Maps a transport result to an outcome, classifying the failure case.
pub fn classify_result<R>(
    result: Result<R, RemoteError>,
    config: &SyncConfig,
    detector: Option<&dyn ConflictDetector>,
) -> SyncOutcome<R> {
    match result {
        Ok(data) => SyncOutcome::Success(data),
        Err(error) => classify(&error, config, detector),
    }
}

fn classify_http<R>(
    status: u16,
    body: &str,
    config: &SyncConfig,
    detector: Option<&dyn ConflictDetector>,
) -> SyncOutcome<R> {
    let extracted = extract_message(body);

    if config.conflict_codes.contains(&status) {
        let conflict_type = detector
            .and_then(|d| d.detect(body))
            .unwrap_or_else(|| default_conflict_type(body));
        let message = extracted.unwrap_or_else(|| format!("conflict (HTTP {status})"));
        let mut conflict = Conflict::new(message, conflict_type);
        if !body.is_empty() {
            conflict = conflict.with_details(body);
        }
        return SyncOutcome::Conflict(conflict);
    }

    if config.non_retryable_codes.contains(&status) {
        let message = extracted.unwrap_or_else(|| format!("HTTP {status}"));
        let mut error =
            PermanentError::new(message, error_codes::http(status)).with_http_code(status);
        if !body.is_empty() {
            error = error.with_details(body);
        }
        return SyncOutcome::Permanent(error);
    }

    let message = match (&extracted, (500..=599).contains(&status)) {
        (Some(msg), true) => format!("server error (HTTP {status}): {msg}"),
        (None, true) => format!("server error (HTTP {status})"),
        (Some(msg), false) => format!("unexpected HTTP {status}: {msg}"),
        (None, false) => format!("unexpected HTTP {status}"),
    };
    SyncOutcome::Retryable(
        RetryableError::new(message)
            .with_http_code(status)
            .with_cause(format!("HTTP {status}")),
    )
}

/// Picks a conflict type from keywords in the body (case-insensitive).
pub fn default_conflict_type(body: &str) -> ConflictType {
    let lower = body.to_lowercase();
    CONFLICT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(conflict_type, _)| *conflict_type)
        .unwrap_or(ConflictType::Other)
}

/// Best-effort extraction of an error message from a response body.
///
/// Tries JSON first (`error`, `message`, `mensaje`, or `error.message`),
/// then a plain text scan for `"field": "value"`.
pub fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return message_from_json(&value);
    }

    MESSAGE_FIELDS
        .iter()
        .find_map(|field| scan_string_field(body, field))
}

fn message_from_json(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;
    for field in MESSAGE_FIELDS {
        match object.get(*field) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                return Some(s.clone());
            }
            Some(nested @ serde_json::Value::Object(_)) => {
                if let Some(msg) = message_from_json(nested) {
                    return Some(msg);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds `"field" : "value"` in arbitrary text.
fn scan_string_field(text: &str, field: &str) -> Option<String> {
    let needle = format!("\"{field}\"");
    let mut search_from = 0;

    while let Some(pos) = text[search_from..].find(&needle) {
        let after_key = search_from + pos + needle.len();
        search_from = after_key;

        let rest = text[after_key..].trim_start();
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let Some(rest) = rest.trim_start().strip_prefix('"') else {
            continue;
        };

        let mut value = String::new();
        let mut escaped = false;
        for c in rest.chars() {
            match (escaped, c) {
                (true, c) => {
                    value.push(c);
                    escaped = false;
                }
                (false, '\\') => escaped = true,
                (false, '"') => {
                    return if value.trim().is_empty() {
                        None
                    } else {
                        Some(value)
                    };
                }
                (false, c) => value.push(c),
            }
        }
        // Unterminated string.
        return None;
    }
    None
}
