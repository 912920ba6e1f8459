//! Property-based test generators using proptest.
//!
//! Provides strategies for job input, HTTP failures and configs that keep
//! the engine's invariants.

use offsync_engine::{RemoteError, SyncConfig};
use offsync_protocol::OperationKind;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

/// Strategy for entity IDs as apps generate them (never blank).
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,4}-[0-9a-f]{1,12}").expect("Invalid regex")
}

/// Strategy for strings that trim to nothing.
pub fn blank_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ \t\n]{0,4}").expect("Invalid regex")
}

/// Strategy for operation kinds.
pub fn operation_kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Create),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

/// Strategy for caller extras that avoid the reserved keys.
pub fn extra_input_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::string::string_regex("x_[a-z]{1,8}").expect("Invalid regex"),
        "[ -~]{0,16}",
        0..4,
    )
}

/// Strategy for HTTP status codes a server may answer with.
pub fn http_status_strategy() -> impl Strategy<Value = u16> {
    100u16..=599
}

/// Strategy for response bodies: JSON errors, conflict wording, plain
/// text and garbage.
pub fn response_body_strategy() -> impl Strategy<Value = String> {
    let keyword = prop::sample::select(vec![
        "duplicado",
        "already exists",
        "stock insuficiente",
        "no encontrado",
        "version mismatch",
        "something else",
    ]);
    prop_oneof![
        keyword.clone().prop_map(|k| format!(r#"{{"error":"{k}"}}"#)),
        keyword.clone().prop_map(|k| format!(r#"{{"mensaje":"{k}"}}"#)),
        keyword.prop_map(|k| format!(r#"{{"error":{{"message":"{k}"}}}}"#)),
        "[ -~]{0,40}",
        Just(String::new()),
    ]
}

/// Strategy for any transport failure.
pub fn remote_error_strategy() -> impl Strategy<Value = RemoteError> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(RemoteError::Timeout),
        "[a-z.]{1,12}".prop_map(RemoteError::UnresolvedHost),
        "[a-z ]{0,12}".prop_map(RemoteError::Io),
        "[ -~]{0,12}".prop_map(RemoteError::Other),
        (http_status_strategy(), prop::option::of(response_body_strategy()))
            .prop_map(|(status, body)| RemoteError::Http { status, body }),
    ]
}

/// Strategy for valid configs: disjoint code sets, ordered delays.
pub fn sync_config_strategy() -> impl Strategy<Value = SyncConfig> {
    (
        0u32..6,
        1u64..120,
        prop::collection::btree_set(400u16..500, 0..6),
        prop::collection::btree_set(400u16..500, 0..3),
    )
        .prop_map(|(max_retries, initial_secs, non_retryable, conflicts)| {
            let non_retryable: Vec<u16> = non_retryable.difference(&conflicts).copied().collect();
            SyncConfig::new("Sale")
                .with_max_retries(max_retries)
                .with_retry_delays(
                    Duration::from_secs(initial_secs),
                    Duration::from_secs(initial_secs * 30),
                )
                .with_non_retryable_codes(non_retryable)
                .with_conflict_codes(conflicts)
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
