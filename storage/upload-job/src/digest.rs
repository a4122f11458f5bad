use crate::error::ConfirmationError;

/// A checksum as reported by a storage provider.
pub type Checksum = Vec<u8>;

/// Fixed-width checksum rule shared by every piece of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestPolicy {
    checksum_length: usize,
}

impl DigestPolicy {
    pub const fn new(checksum_length: usize) -> Self {
        Self { checksum_length }
    }

    pub fn checksum_length(&self) -> usize {
        self.checksum_length
    }

    /// Check that every checksum has the expected width.
    ///
    /// Reports the position of the first checksum that doesn't.
    pub fn validate<C>(&self, checksums: &[C]) -> Result<(), ConfirmationError>
    where
        C: AsRef<[u8]>,
    {
        match checksums
            .iter()
            .position(|checksum| checksum.as_ref().len() != self.checksum_length)
        {
            Some(position) => Err(ConfirmationError::ChecksumLengthMismatch {
                position,
                expected: self.checksum_length,
                received: checksums[position].as_ref().len(),
            }),
            None => Ok(()),
        }
    }
}
