use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    digest::DigestPolicy,
    error::ConfirmationError,
    layout::SlotSpec,
    object::{ObjectInfo, PieceKind, PieceRole},
    piece::{PieceConfirmation, PieceSlot},
};

struct PieceSetState {
    slots: Vec<PieceSlot>,
    /// Indices still waiting for a confirmation, only ever shrinks.
    pending: BTreeSet<u32>,
}

/// Tracks the confirmations of all pieces of a single role.
///
/// Confirmations for different pieces commute, they can be applied from any number of threads
/// and in any order, the final state is the same.
pub struct PieceSetJob {
    object: ObjectInfo,
    role: PieceRole,
    kind: PieceKind,
    checksums_per_slot: usize,
    policy: DigestPolicy,
    state: Mutex<PieceSetState>,
}

impl PieceSetJob {
    pub(crate) fn new(
        object: ObjectInfo,
        role: PieceRole,
        spec: &SlotSpec,
        policy: DigestPolicy,
    ) -> Self {
        // `PayloadLayout::derive` keeps slot counts within `u32`
        debug_assert!(u32::try_from(spec.slot_count).is_ok());
        let slot_count = spec.slot_count as u32;
        Self {
            object,
            role,
            kind: spec.kind,
            checksums_per_slot: spec.checksums_per_slot,
            policy,
            state: Mutex::new(PieceSetState {
                slots: (0..slot_count)
                    .map(|index| PieceSlot::new(index, spec.checksums_per_slot))
                    .collect(),
                pending: (0..slot_count).collect(),
            }),
        }
    }

    /// Every mutation is fully validated before it is written,
    /// so the state behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, PieceSetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn role(&self) -> PieceRole {
        self.role
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn checksums_per_slot(&self) -> usize {
        self.checksums_per_slot
    }

    /// Apply a sealing confirmation.
    ///
    /// Re-applying a confirmation for a piece that is already done overwrites the recorded proof
    /// but does not count towards completion twice.
    pub fn done(&self, confirmation: &PieceConfirmation) -> Result<(), ConfirmationError> {
        let mut state = self.lock();
        if let Err(err) = self.validate(&state, confirmation) {
            tracing::warn!(
                object_id = self.object.object_id,
                role = %self.role,
                piece_index = confirmation.seal.piece_index,
                %err,
                "rejected piece confirmation"
            );
            return Err(err);
        }

        let index = confirmation.seal.piece_index;
        state.slots[index as usize].record(&confirmation.seal);
        if state.pending.remove(&index) {
            tracing::debug!(
                object_id = self.object.object_id,
                role = %self.role,
                piece_index = index,
                provider = %confirmation.seal.storage_provider_id,
                pending = state.pending.len(),
                "piece sealed"
            );
            if state.pending.is_empty() {
                tracing::info!(
                    object_id = self.object.object_id,
                    role = %self.role,
                    "all pieces sealed"
                );
            }
        } else {
            tracing::debug!(
                object_id = self.object.object_id,
                role = %self.role,
                piece_index = index,
                "piece re-sealed"
            );
        }

        Ok(())
    }

    fn validate(
        &self,
        state: &PieceSetState,
        confirmation: &PieceConfirmation,
    ) -> Result<(), ConfirmationError> {
        if confirmation.object_id != self.object.object_id {
            return Err(ConfirmationError::ObjectIdMismatch {
                expected: self.object.object_id,
                received: confirmation.object_id,
            });
        }
        if confirmation.payload_size != self.object.size {
            return Err(ConfirmationError::PayloadSizeMismatch {
                expected: self.object.size,
                received: confirmation.payload_size,
            });
        }
        if confirmation.redundancy_type != self.object.redundancy_type {
            return Err(ConfirmationError::RedundancyTypeMismatch {
                expected: self.object.redundancy_type,
                received: confirmation.redundancy_type,
            });
        }

        let seal = &confirmation.seal;
        let Some(slot) = state.slots.get(seal.piece_index as usize) else {
            return Err(ConfirmationError::IndexOutOfRange {
                index: seal.piece_index,
                slot_count: state.slots.len(),
            });
        };

        if seal.piece_checksums.len() != slot.expected_checksums() {
            return Err(ConfirmationError::ChecksumCountMismatch {
                expected: slot.expected_checksums(),
                received: seal.piece_checksums.len(),
            });
        }

        self.policy.validate(&seal.piece_checksums)
    }

    /// Snapshot of the slots still waiting for a confirmation, ordered by index.
    pub fn pending(&self) -> Vec<PieceSlot> {
        let state = self.lock();
        state
            .pending
            .iter()
            .map(|index| state.slots[*index as usize].clone())
            .collect()
    }

    pub fn pending_indices(&self) -> Vec<u32> {
        self.lock().pending.iter().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn completed(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn slot(&self, index: u32) -> Option<PieceSlot> {
        self.lock().slots.get(index as usize).cloned()
    }

    /// Snapshot of all slots.
    pub fn slots(&self) -> Vec<PieceSlot> {
        self.lock().slots.clone()
    }
}
