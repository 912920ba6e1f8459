//! Benchmark utilities.

use offsync_engine::RemoteError;
use rand::seq::SliceRandom;
use rand::Rng;

const BODIES: &[&str] = &[
    r#"{"error":"stock insuficiente para el producto 12"}"#,
    r#"{"mensaje":"venta duplicado"}"#,
    r#"{"error":{"message":"version mismatch"}}"#,
    "Bad Gateway",
    "",
];

/// Generate a batch of failures shaped like a flaky mobile link.
pub fn random_failures(count: usize) -> Vec<RemoteError> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| match rng.gen_range(0..10) {
            0 => RemoteError::Timeout("read timed out".into()),
            1 => RemoteError::UnresolvedHost("pos.example.com".into()),
            2 => RemoteError::Io("connection reset".into()),
            _ => {
                let status = *[400u16, 401, 404, 409, 422, 500, 502, 503]
                    .choose(&mut rng)
                    .unwrap_or(&503);
                let body = BODIES.choose(&mut rng).copied().unwrap_or_default();
                RemoteError::http(status, body)
            }
        })
        .collect()
}

/// Generate entity IDs.
pub fn entity_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("e-{i:06}")).collect()
}
