//! Per-object upload job tracking for a storage provider.
//!
//! An uploaded object is split into primary pieces, holding the original segments, and secondary
//! pieces, holding replicas or erasure coded shards. Every piece is expected to be sealed by a
//! storage provider, which reports back with a [`PieceConfirmation`]. The [`UploadPayloadJob`]
//! validates and records those confirmations, as they arrive in any order, and reports which
//! pieces are still pending.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod job;
pub mod layout;
pub mod object;
pub mod piece;
pub mod piece_set;

pub use config::UploadConfig;
pub use error::{ConfirmationError, JobError};
pub use job::{JobContext, UploadPayloadJob};
pub use layout::PayloadLayout;
pub use object::{ObjectId, ObjectInfo, PieceKind, PieceRole, RedundancyType};
pub use piece::{PieceConfirmation, PieceSlot, SealInfo};
pub use piece_set::PieceSetJob;

#[cfg(test)]
mod fixtures {
    use sha2::{Digest, Sha256};

    use crate::{digest::Checksum, piece::SealInfo};

    pub(crate) fn checksum(data: &[u8]) -> Checksum {
        Sha256::digest(data).to_vec()
    }

    /// Generate `count` distinct, well formed, checksums.
    pub(crate) fn checksums(count: usize) -> Vec<Checksum> {
        (0..count)
            .map(|idx| checksum(format!("segment-{idx}").as_bytes()))
            .collect()
    }

    pub(crate) fn seal(piece_index: u32, piece_checksums: Vec<Checksum>) -> SealInfo {
        SealInfo {
            storage_provider_id: "test-storage-provider".to_string(),
            piece_index,
            piece_checksums,
            integrity_hash: checksum(b"integrity"),
            signature: checksum(b"signature"),
        }
    }
}
