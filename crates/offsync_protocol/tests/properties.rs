//! Property tests for job input and the entity status lifecycle.

use offsync_protocol::{
    JobInput, OperationKind, ProtocolError, SyncStatus, ENTITY_ID_KEY, OPERATION_TYPE_KEY,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Create),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

fn status_strategy() -> impl Strategy<Value = SyncStatus> {
    prop_oneof![
        Just(SyncStatus::PendingCreate),
        Just(SyncStatus::PendingUpdate),
        Just(SyncStatus::PendingDelete),
        Just(SyncStatus::Syncing),
        Just(SyncStatus::Synced),
        Just(SyncStatus::Error),
    ]
}

fn extras_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("x_[a-z]{1,8}", "[ -~]{0,16}", 0..4)
}

proptest! {
    #[test]
    fn job_input_survives_storage(
        id in "[a-z]{1,4}-[0-9]{1,6}",
        kind in kind_strategy(),
        extra in extras_strategy(),
    ) {
        let input = JobInput::new(id.clone(), kind, extra.clone()).unwrap();
        let stored = serde_json::to_string(&input).unwrap();
        let restored: JobInput = serde_json::from_str(&stored).unwrap();

        prop_assert_eq!(restored.entity_id(), Some(id.as_str()));
        prop_assert_eq!(restored.operation_kind(), kind);
        prop_assert_eq!(restored.additional_data(), extra);
    }

    #[test]
    fn reserved_keys_are_rejected(
        reserved in prop::sample::select(vec![ENTITY_ID_KEY, OPERATION_TYPE_KEY]),
        value in "[a-z]{0,8}",
    ) {
        let err = JobInput::new("s-1", OperationKind::Update, [(reserved.to_string(), value)])
            .unwrap_err();
        prop_assert_eq!(err, ProtocolError::ReservedKey(reserved.to_string()));
    }

    #[test]
    fn operation_names_parse_in_any_case(kind in kind_strategy(), lower in any::<bool>()) {
        let name = if lower {
            kind.as_str().to_ascii_lowercase()
        } else {
            kind.as_str().to_string()
        };
        prop_assert_eq!(OperationKind::from_name(&format!(" {name} ")), Some(kind));
    }

    #[test]
    fn unknown_operation_defaults_to_create(name in "[a-z]{0,10}") {
        prop_assume!(OperationKind::from_name(&name).is_none());
        prop_assert_eq!(OperationKind::parse_or_default(Some(&name)), OperationKind::Create);
    }

    #[test]
    fn transition_agrees_with_can_transition(from in status_strategy(), to in status_strategy()) {
        match from.transition(to) {
            Ok(next) => {
                prop_assert!(from.can_transition_to(to));
                prop_assert_eq!(next, to);
            }
            Err(err) => {
                prop_assert!(!from.can_transition_to(to));
                prop_assert_eq!(err, ProtocolError::InvalidTransition { from, to });
            }
        }
    }

    #[test]
    fn syncing_always_resolves(kind in kind_strategy()) {
        let syncing = SyncStatus::pending_for(kind).transition(SyncStatus::Syncing).unwrap();
        prop_assert!(syncing.can_transition_to(SyncStatus::Synced));
        prop_assert!(syncing.can_transition_to(SyncStatus::Error));
        prop_assert!(!syncing.needs_sync());
    }
}
