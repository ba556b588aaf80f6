//! Property tests for the source registry and the receive-state tracker

use std::collections::HashSet;

use bassist_core::{
    Address, BisSyncFailurePolicy, EncryptionState, PaInterval, PaSyncState, ReceiveState,
    SubgroupState,
};
use bassist_runtime::managers::{ReceiveStateTracker, SourceRegistry, Transition};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum RegistryOp {
    Upsert(u8),
    Consume(u8),
    Clear(u8),
    Reset(u8),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        4 => (0u8..24).prop_map(RegistryOp::Upsert),
        3 => (0u8..24).prop_map(RegistryOp::Consume),
        1 => (0u8..24).prop_map(RegistryOp::Clear),
        1 => (0u8..4).prop_map(RegistryOp::Reset),
    ]
}

fn address(n: u8) -> Address {
    Address::random([n, 0, 0, 0, 0, 0xC0])
}

fn pa_state() -> impl Strategy<Value = PaSyncState> {
    (0u8..5).prop_map(PaSyncState::from)
}

fn encryption_state() -> impl Strategy<Value = EncryptionState> {
    (0u8..4).prop_map(EncryptionState::from)
}

fn bis_value() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), Just(0xFFFF_FFFF), 1u32..16]
}

fn receive_state() -> impl Strategy<Value = ReceiveState> {
    (pa_state(), encryption_state(), prop::collection::vec(bis_value(), 0..4)).prop_map(
        |(pa, encryption, bis)| ReceiveState {
            pa_sync_state: pa,
            encryption,
            subgroups: bis.into_iter().map(SubgroupState::with_bis_sync).collect(),
            ..ReceiveState::default()
        },
    )
}

proptest! {
    #[test]
    fn registry_stays_bounded(capacity in 1usize..10, ops in prop::collection::vec(registry_op(), 0..200)) {
        let mut registry = SourceRegistry::new(capacity);
        registry.reset(3);
        let mut granted = 3u8;

        for op in ops {
            match op {
                RegistryOp::Upsert(n) => {
                    let known = registry.get(&address(n)).is_some();
                    let full = registry.len() >= capacity;
                    let entry = registry.upsert(address(n), 1, PaInterval(80));
                    prop_assert_eq!(entry.is_some(), known || !full);
                }
                RegistryOp::Consume(n) => {
                    let before = registry.get(&address(n)).map(|s| s.sync_attempts_remaining);
                    let spent = registry.consume_attempt(&address(n));
                    prop_assert_eq!(spent, before.is_some_and(|left| left > 0));
                }
                RegistryOp::Clear(n) => {
                    registry.clear_countdown(&address(n));
                    if let Some(source) = registry.get(&address(n)) {
                        prop_assert_eq!(source.sync_attempts_remaining, 0);
                    }
                }
                RegistryOp::Reset(attempts) => {
                    registry.reset(attempts);
                    granted = attempts;
                    prop_assert!(registry.is_empty());
                }
            }

            prop_assert!(registry.len() <= capacity);
            let unique: HashSet<_> = registry.iter().map(|s| s.address).collect();
            prop_assert_eq!(unique.len(), registry.len());
            for source in registry.iter() {
                prop_assert!(source.sync_attempts_remaining <= granted);
            }
        }
    }

    #[test]
    fn tracker_update_is_idempotent(first in receive_state(), second in receive_state()) {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        tracker.update(&first);
        let update = tracker.update(&second);
        prop_assert!(update.applied());

        let again = tracker.update(&second);
        prop_assert!(again.transitions.is_empty());
        prop_assert_eq!(tracker.snapshot(), &second);

        // At most one transition per dimension
        let encryption = update.transitions.iter().filter(|t| matches!(t, Transition::Encryption(_))).count();
        let pa = update.transitions.iter().filter(|t| matches!(t, Transition::PaSync(_))).count();
        let bis = update.transitions.iter().filter(|t| matches!(t, Transition::BisSync { .. })).count();
        prop_assert!(encryption <= 1 && pa <= 1 && bis <= 1);
    }

    #[test]
    fn tracker_reports_changed_dimensions(state in receive_state()) {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::PerSubgroup);
        let update = tracker.update(&state);

        let pa_changed = state.pa_sync_state != PaSyncState::NotSynced;
        prop_assert_eq!(update.transitions.contains(&Transition::PaSync(state.pa_sync_state)), pa_changed);

        let enc_changed = state.encryption != EncryptionState::NotEncrypted;
        prop_assert_eq!(update.transitions.contains(&Transition::Encryption(state.encryption)), enc_changed);

        let bis_changed = state.subgroups.iter().any(|s| s.bis_sync != 0);
        let has_bis = update.transitions.iter().any(|t| matches!(t, Transition::BisSync { .. }));
        prop_assert_eq!(has_bis, bis_changed);
    }
}
