use serde::{Deserialize, Serialize};

use crate::digest::DigestPolicy;

/// Objects at or below this size are stored as a single inline blob.
pub const DEFAULT_INLINE_THRESHOLD: u64 = 1024 * 1024;

/// Size of every segment of a non-inline object, except possibly the last one.
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Number of erasure coding data shards (M).
pub const DEFAULT_EC_DATA_SHARDS: u32 = 4;

/// Number of erasure coding parity shards (K).
pub const DEFAULT_EC_PARITY_SHARDS: u32 = 2;

/// Width, in bytes, of every piece checksum.
pub const DEFAULT_CHECKSUM_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("segment size must be larger than zero")]
    ZeroSegmentSize,

    #[error("erasure coding requires at least one data shard")]
    ZeroDataShards,

    #[error("checksum length must be larger than zero")]
    ZeroChecksumLength,

    #[error("{data} data shards plus {parity} parity shards do not fit in a u32")]
    TooManyShards { data: u32, parity: u32 },
}

/// Segmentation, redundancy and digest parameters used when building an upload job.
///
/// Deserializing a partial document only overrides the fields it contains,
/// the rest keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub inline_threshold: u64,
    pub segment_size: u64,
    pub ec_data_shards: u32,
    pub ec_parity_shards: u32,
    pub checksum_length: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            segment_size: DEFAULT_SEGMENT_SIZE,
            ec_data_shards: DEFAULT_EC_DATA_SHARDS,
            ec_parity_shards: DEFAULT_EC_PARITY_SHARDS,
            checksum_length: DEFAULT_CHECKSUM_LENGTH,
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.ec_data_shards == 0 {
            return Err(ConfigError::ZeroDataShards);
        }
        if self.checksum_length == 0 {
            return Err(ConfigError::ZeroChecksumLength);
        }
        if self.ec_data_shards.checked_add(self.ec_parity_shards).is_none() {
            return Err(ConfigError::TooManyShards {
                data: self.ec_data_shards,
                parity: self.ec_parity_shards,
            });
        }
        Ok(())
    }

    /// Total number of erasure coded providers, `M + K`.
    ///
    /// Saturates for configurations rejected by [`UploadConfig::validate`].
    pub fn ec_shard_count(&self) -> u32 {
        self.ec_data_shards.saturating_add(self.ec_parity_shards)
    }

    pub fn digest_policy(&self) -> DigestPolicy {
        DigestPolicy::new(self.checksum_length)
    }
}
