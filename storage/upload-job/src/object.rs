use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Numeric identifier of an object, assigned when the object is created on-chain.
pub type ObjectId = u64;

/// How the redundant copy of an object is stored by the secondary providers.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedundancyType {
    /// Segments are erasure coded into `M` data and `K` parity shards.
    #[default]
    ErasureCoded,
    /// Every segment is copied as-is.
    Replica,
    /// Small objects, mirrored as a single blob.
    Inline,
}

impl TryFrom<i32> for RedundancyType {
    type Error = JobError;

    /// Decode the wire representation, erasure coding being `0` as it is the default type.
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ErasureCoded),
            1 => Ok(Self::Replica),
            2 => Ok(Self::Inline),
            unknown => Err(JobError::UnknownRedundancyType(unknown)),
        }
    }
}

impl From<RedundancyType> for i32 {
    fn from(value: RedundancyType) -> Self {
        match value {
            RedundancyType::ErasureCoded => 0,
            RedundancyType::Replica => 1,
            RedundancyType::Inline => 2,
        }
    }
}

impl core::fmt::Display for RedundancyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ErasureCoded => write!(f, "erasure-coded"),
            Self::Replica => write!(f, "replica"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// Metadata of the object being uploaded. Never changed by the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_id: ObjectId,
    /// Payload size in bytes.
    pub size: u64,
    pub redundancy_type: RedundancyType,
}

impl ObjectInfo {
    pub fn new(object_id: ObjectId, size: u64, redundancy_type: RedundancyType) -> Self {
        Self {
            object_id,
            size,
            redundancy_type,
        }
    }
}

/// Which group of storage providers a piece is destined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PieceRole {
    /// Holds the original segment data.
    Primary,
    /// Holds the redundancy data, replicas or erasure coded shards.
    Secondary,
}

impl core::fmt::Display for PieceRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceKind {
    Segment,
    ErasureCoded,
}
