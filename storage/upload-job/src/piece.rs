use serde::{Deserialize, Serialize};

use crate::{
    digest::Checksum,
    object::{ObjectId, ObjectInfo, RedundancyType},
};

/// Proof, sent by a storage provider, that it durably stored its piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealInfo {
    pub storage_provider_id: String,
    pub piece_index: u32,
    /// One checksum per segment, or segment shard, held by the provider.
    pub piece_checksums: Vec<Checksum>,
    pub integrity_hash: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Sealing confirmation as delivered over the wire.
///
/// The object fields bind the confirmation to a job and must match it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceConfirmation {
    pub object_id: ObjectId,
    pub payload_size: u64,
    pub redundancy_type: RedundancyType,
    pub seal: SealInfo,
}

impl PieceConfirmation {
    /// Bind a [`SealInfo`] to the given object.
    pub fn new(object: &ObjectInfo, seal: SealInfo) -> Self {
        Self {
            object_id: object.object_id,
            payload_size: object.size,
            redundancy_type: object.redundancy_type,
            seal,
        }
    }
}

/// Tracked state of a single expected confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceSlot {
    index: u32,
    expected_checksums: usize,
    storage_provider_id: Option<String>,
    checksums: Vec<Checksum>,
    integrity_hash: Vec<u8>,
    signature: Vec<u8>,
    done: bool,
}

impl PieceSlot {
    pub(crate) fn new(index: u32, expected_checksums: usize) -> Self {
        Self {
            index,
            expected_checksums,
            storage_provider_id: None,
            checksums: vec![],
            integrity_hash: vec![],
            signature: vec![],
            done: false,
        }
    }

    /// Overwrite the recorded proof and mark the piece as done.
    ///
    /// The seal must have been validated against this slot beforehand.
    pub(crate) fn record(&mut self, seal: &SealInfo) {
        self.storage_provider_id = Some(seal.storage_provider_id.clone());
        self.checksums = seal.piece_checksums.clone();
        self.integrity_hash = seal.integrity_hash.clone();
        self.signature = seal.signature.clone();
        self.done = true;
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn expected_checksums(&self) -> usize {
        self.expected_checksums
    }

    /// Provider that sealed this piece, if any did.
    pub fn storage_provider_id(&self) -> Option<&str> {
        self.storage_provider_id.as_deref()
    }

    pub fn checksums(&self) -> &[Checksum] {
        &self.checksums
    }

    pub fn integrity_hash(&self) -> &[u8] {
        &self.integrity_hash
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
