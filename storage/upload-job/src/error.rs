use crate::{
    config::ConfigError,
    db::JobDBError,
    object::{ObjectId, PieceRole, RedundancyType},
};

/// Reasons a piece confirmation gets rejected.
///
/// A rejected confirmation never changes the state of the job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("confirmation is bound to object {received}, but the job tracks object {expected}")]
    ObjectIdMismatch {
        expected: ObjectId,
        received: ObjectId,
    },

    #[error("confirmation reports a payload of {received} bytes, expected {expected}")]
    PayloadSizeMismatch { expected: u64, received: u64 },

    #[error("confirmation reports redundancy type {received}, expected {expected}")]
    RedundancyTypeMismatch {
        expected: RedundancyType,
        received: RedundancyType,
    },

    #[error("piece index {index} is out of range, the job has {slot_count} pieces")]
    IndexOutOfRange { index: u32, slot_count: usize },

    #[error("piece requires {expected} checksums, but {received} were provided")]
    ChecksumCountMismatch { expected: usize, received: usize },

    #[error("checksum at position {position} has length {received}, instead of {expected}")]
    ChecksumLengthMismatch {
        position: usize,
        expected: usize,
        received: usize,
    },
}

/// Errors raised while building an upload job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("object {0} has an empty payload")]
    ZeroSize(ObjectId),

    #[error("object {object_id} splits into {pieces} pieces, more than a piece index can address")]
    TooManyPieces { object_id: ObjectId, pieces: u64 },

    #[error("unknown redundancy type: {0}")]
    UnknownRedundancyType(i32),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] JobDBError),

    #[error("persisted seal for {role} piece {index} does not fit the job: {source}")]
    Resume {
        role: PieceRole,
        index: u32,
        #[source]
        source: ConfirmationError,
    },
}
