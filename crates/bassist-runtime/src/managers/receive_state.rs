//! Receive-state diffing
//!
//! Each sink connection keeps the last receive state its scan delegator
//! reported. A new report is compared against that snapshot in three
//! independent dimensions (encryption, PA sync, BIS sync) and yields at most
//! one transition per dimension.

use bassist_core::receive_state::BIS_SYNC_FAILED;
use bassist_core::{BisSyncFailurePolicy, EncryptionState, PaSyncState, ReceiveState};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Encryption(EncryptionState),
    PaSync(PaSyncState),
    BisSync { synced: bool },
}

/// A state value the delegator should never report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    UnknownEncryptionState(u8),
    UnknownPaSyncState(u8),
}

/// Outcome of one update pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// Transitions found before the pass ended, in dimension order
    pub transitions: Vec<Transition>,
    /// Set when the pass was abandoned; the snapshot is then left untouched
    pub anomaly: Option<Anomaly>,
}

impl TrackerUpdate {
    pub fn applied(&self) -> bool {
        self.anomaly.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ReceiveStateTracker {
    snapshot: ReceiveState,
    policy: BisSyncFailurePolicy,
}

impl ReceiveStateTracker {
    pub fn new(policy: BisSyncFailurePolicy) -> Self {
        Self { snapshot: ReceiveState::default(), policy }
    }

    pub fn snapshot(&self) -> &ReceiveState {
        &self.snapshot
    }

    /// Forget the stored state, e.g. before a new source is added
    pub fn reset(&mut self) {
        self.snapshot = ReceiveState::default();
    }

    pub fn update(&mut self, new: &ReceiveState) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();

        if new.encryption != self.snapshot.encryption {
            info!("Encryption state {:?} -> {:?}", self.snapshot.encryption, new.encryption);
            if let EncryptionState::Unknown(value) = new.encryption {
                error!("Invalid encryption state transition to {}", value);
                update.anomaly = Some(Anomaly::UnknownEncryptionState(value));
                return update;
            }
            update.transitions.push(Transition::Encryption(new.encryption));
        }

        if new.pa_sync_state != self.snapshot.pa_sync_state {
            info!("PA sync state {:?} -> {:?}", self.snapshot.pa_sync_state, new.pa_sync_state);
            if let PaSyncState::Unknown(value) = new.pa_sync_state {
                error!("Invalid PA sync state transition to {}", value);
                update.anomaly = Some(Anomaly::UnknownPaSyncState(value));
                return update;
            }
            update.transitions.push(Transition::PaSync(new.pa_sync_state));
        }

        if let Some(synced) = self.bis_sync_transition(new) {
            update.transitions.push(Transition::BisSync { synced });
        }

        self.snapshot = new.clone();
        update
    }

    /// `Some(synced)` when any subgroup's BIS sync changed
    fn bis_sync_transition(&self, new: &ReceiveState) -> Option<bool> {
        let mut changed = false;
        let mut synced = false;

        for (index, subgroup) in new.subgroups.iter().enumerate() {
            let previous = self.snapshot.bis_sync(index);
            debug!("bis_sync[{}]: {:#x} -> {:#x}", index, previous, subgroup.bis_sync);
            if subgroup.bis_sync == previous {
                continue;
            }
            changed = true;

            if subgroup.bis_sync == BIS_SYNC_FAILED {
                match self.policy {
                    BisSyncFailurePolicy::WholeGroup => {
                        error!("Failed to sync to BIG (subgroup {})", index);
                        synced = false;
                        break;
                    }
                    BisSyncFailurePolicy::PerSubgroup => {
                        error!("Failed to sync subgroup {}", index);
                        continue;
                    }
                }
            }
            synced = synced || subgroup.bis_sync != 0;
        }

        changed.then_some(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bassist_core::SubgroupState;

    fn state(pa: PaSyncState, enc: EncryptionState, bis: &[u32]) -> ReceiveState {
        ReceiveState {
            pa_sync_state: pa,
            encryption: enc,
            subgroups: bis.iter().copied().map(SubgroupState::with_bis_sync).collect(),
            ..ReceiveState::default()
        }
    }

    #[test]
    fn test_each_dimension_once() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        let new = state(PaSyncState::Synced, EncryptionState::Decrypting, &[1, 0]);

        let update = tracker.update(&new);
        assert_eq!(
            update.transitions,
            vec![
                Transition::Encryption(EncryptionState::Decrypting),
                Transition::PaSync(PaSyncState::Synced),
                Transition::BisSync { synced: true },
            ]
        );
        assert_eq!(tracker.snapshot(), &new);
    }

    #[test]
    fn test_same_state_twice_is_silent() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        let new = state(PaSyncState::InfoRequested, EncryptionState::BroadcastCodeRequired, &[3]);

        assert_eq!(tracker.update(&new).transitions.len(), 3);
        let second = tracker.update(&new);
        assert!(second.transitions.is_empty());
        assert!(second.applied());
    }

    #[test]
    fn test_failed_subgroup_overrides_others() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        tracker.update(&state(PaSyncState::Synced, EncryptionState::NotEncrypted, &[1, 3]));

        let update = tracker.update(&state(
            PaSyncState::Synced,
            EncryptionState::NotEncrypted,
            &[BIS_SYNC_FAILED, 3],
        ));
        assert_eq!(update.transitions, vec![Transition::BisSync { synced: false }]);
    }

    #[test]
    fn test_per_subgroup_policy() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::PerSubgroup);
        tracker.update(&state(PaSyncState::Synced, EncryptionState::NotEncrypted, &[1, 0]));

        let update = tracker.update(&state(
            PaSyncState::Synced,
            EncryptionState::NotEncrypted,
            &[BIS_SYNC_FAILED, 3],
        ));
        assert_eq!(update.transitions, vec![Transition::BisSync { synced: true }]);
    }

    #[test]
    fn test_unknown_value_abandons_pass() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        let bad = state(PaSyncState::Unknown(9), EncryptionState::Decrypting, &[1]);

        let update = tracker.update(&bad);
        assert_eq!(update.transitions, vec![Transition::Encryption(EncryptionState::Decrypting)]);
        assert_eq!(update.anomaly, Some(Anomaly::UnknownPaSyncState(9)));
        assert_eq!(tracker.snapshot(), &ReceiveState::default());
    }

    #[test]
    fn test_reset() {
        let mut tracker = ReceiveStateTracker::new(BisSyncFailurePolicy::WholeGroup);
        let synced = state(PaSyncState::Synced, EncryptionState::NotEncrypted, &[1]);
        tracker.update(&synced);
        tracker.reset();
        assert_eq!(tracker.update(&synced).transitions.len(), 2);
    }
}
