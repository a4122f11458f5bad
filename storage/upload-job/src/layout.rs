//! Decomposition of an object into the pieces that need to be confirmed.
//!
//! The slot count of a role is the number of independent confirmations that are outstanding,
//! while the checksums per slot is the number of integrity proofs a single confirmation bundles.
//! Both are derived once, from the object size and redundancy type alone.

use serde::Serialize;

use crate::{
    config::UploadConfig,
    error::JobError,
    object::{ObjectInfo, PieceKind, PieceRole, RedundancyType},
};

/// Number of segments a payload of `size` bytes is split into.
pub fn segment_count(size: u64, segment_size: u64) -> u64 {
    size.div_ceil(segment_size)
}

/// Shape of the pieces tracked for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSpec {
    pub kind: PieceKind,
    pub slot_count: usize,
    pub checksums_per_slot: usize,
}

impl SlotSpec {
    const fn segments(slot_count: usize) -> Self {
        Self {
            kind: PieceKind::Segment,
            slot_count,
            checksums_per_slot: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadLayout {
    /// Whether the object is stored as a single blob.
    pub inline: bool,
    pub segment_count: u64,
    pub primary: SlotSpec,
    pub secondary: SlotSpec,
}

impl PayloadLayout {
    pub fn derive(
        size: u64,
        redundancy_type: RedundancyType,
        config: &UploadConfig,
    ) -> Result<Self, DeriveError> {
        config.validate()?;
        if size == 0 {
            return Err(DeriveError::ZeroSize);
        }

        if size <= config.inline_threshold {
            return Ok(Self {
                inline: true,
                segment_count: 1,
                primary: SlotSpec::segments(1),
                secondary: SlotSpec::segments(1),
            });
        }

        let segments = segment_count(size, config.segment_size);
        // Piece indices travel as `u32`
        let slot_count = u32::try_from(segments)
            .map_err(|_| DeriveError::TooManyPieces(segments))? as usize;
        let secondary = match redundancy_type {
            RedundancyType::ErasureCoded => SlotSpec {
                kind: PieceKind::ErasureCoded,
                slot_count: config.ec_shard_count() as usize,
                // One shard per segment lands at each provider
                checksums_per_slot: slot_count,
            },
            // An oversized inline object can't be kept as a single blob, so it gets mirrored per segment
            RedundancyType::Replica | RedundancyType::Inline => SlotSpec::segments(slot_count),
        };

        Ok(Self {
            inline: false,
            segment_count: segments,
            primary: SlotSpec::segments(slot_count),
            secondary,
        })
    }

    /// Derive the layout for the provided object.
    pub fn for_object(object: &ObjectInfo, config: &UploadConfig) -> Result<Self, JobError> {
        Self::derive(object.size, object.redundancy_type, config).map_err(|err| match err {
            DeriveError::ZeroSize => JobError::ZeroSize(object.object_id),
            DeriveError::TooManyPieces(pieces) => JobError::TooManyPieces {
                object_id: object.object_id,
                pieces,
            },
            DeriveError::Config(err) => JobError::Config(err),
        })
    }

    pub fn spec(&self, role: PieceRole) -> &SlotSpec {
        match role {
            PieceRole::Primary => &self.primary,
            PieceRole::Secondary => &self.secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeriveError {
    #[error("payload size must be larger than zero")]
    ZeroSize,

    #[error("payload splits into {0} pieces, more than a piece index can address")]
    TooManyPieces(u64),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
