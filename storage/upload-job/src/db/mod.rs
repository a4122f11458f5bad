//! Durable bookkeeping of upload jobs, so that tracking can resume after a restart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    object::{ObjectId, ObjectInfo, PieceRole},
    piece::SealInfo,
};

mod memory;
mod rdb;

pub use memory::MemJobDB;
pub use rdb::{RocksDBJobDB, PIECE_SEALS_CF, UPLOAD_JOBS_CF};

#[derive(Debug, thiserror::Error)]
pub enum JobDBError {
    #[error("no upload job for object {0}")]
    NotFound(ObjectId),

    #[error("an upload job with different object information already exists for object {0}")]
    ObjectMismatch(ObjectId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error(transparent)]
    RocksDB(#[from] rocksdb::Error),
}

/// Lifecycle of an upload job, driven by whoever orchestrates the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Uploading,
    /// Both primary and secondary pieces have been sealed.
    Uploaded,
    Abandoned,
}

/// Persisted view of an upload job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub object: ObjectInfo,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Applied primary confirmations, keyed by piece index.
    pub primary_seals: BTreeMap<u32, SealInfo>,
    /// Applied secondary confirmations, keyed by piece index.
    pub secondary_seals: BTreeMap<u32, SealInfo>,
}

impl JobRecord {
    pub fn new(object: ObjectInfo) -> Self {
        let now = Utc::now();
        Self {
            object,
            state: JobState::Created,
            created_at: now,
            updated_at: now,
            primary_seals: BTreeMap::new(),
            secondary_seals: BTreeMap::new(),
        }
    }

    pub fn seals(&self, role: PieceRole) -> &BTreeMap<u32, SealInfo> {
        match role {
            PieceRole::Primary => &self.primary_seals,
            PieceRole::Secondary => &self.secondary_seals,
        }
    }

    pub(crate) fn seals_mut(&mut self, role: PieceRole) -> &mut BTreeMap<u32, SealInfo> {
        match role {
            PieceRole::Primary => &mut self.primary_seals,
            PieceRole::Secondary => &mut self.secondary_seals,
        }
    }
}

pub trait JobDB: Send + Sync {
    /// Create the record for an upload job, or find the existing one.
    ///
    /// * If a record exists, it is returned as is, including its seals.
    /// * If the existing record belongs to a different object, returns [`JobDBError::ObjectMismatch`].
    fn create_upload_job(&self, object: &ObjectInfo) -> Result<JobRecord, JobDBError>;

    fn get_upload_job(&self, object_id: ObjectId) -> Result<Option<JobRecord>, JobDBError>;

    /// * If the job does not exist, returns [`JobDBError::NotFound`].
    fn set_job_state(&self, object_id: ObjectId, state: JobState) -> Result<(), JobDBError>;

    /// Store a snapshot of an applied confirmation, overwriting any previous one for the same piece.
    ///
    /// * If the job does not exist, returns [`JobDBError::NotFound`].
    fn set_piece_sealed(
        &self,
        object_id: ObjectId,
        role: PieceRole,
        seal: &SealInfo,
    ) -> Result<(), JobDBError>;

    /// Remove the job along with its seals. Removing an unknown job is a no-op.
    fn remove_upload_job(&self, object_id: ObjectId) -> Result<(), JobDBError>;

    fn list_upload_jobs(&self) -> Result<Vec<ObjectId>, JobDBError>;
}

/// Backend agnostic checks, run against every [`JobDB`] implementation.
#[cfg(test)]
pub(crate) mod tests {
    use super::{JobDB, JobDBError, JobState};
    use crate::{
        fixtures::{checksums, seal},
        object::{ObjectInfo, PieceRole, RedundancyType},
    };

    pub(crate) fn create_or_find<DB: JobDB>(db: &DB) {
        let object = ObjectInfo::new(1, 1024, RedundancyType::Inline);
        assert!(matches!(db.get_upload_job(1), Ok(None)));

        let created = db.create_upload_job(&object).unwrap();
        assert_eq!(created.object, object);
        assert_eq!(created.state, JobState::Created);
        assert!(created.primary_seals.is_empty());

        db.set_piece_sealed(1, PieceRole::Primary, &seal(0, checksums(1))).unwrap();
        let found = db.create_upload_job(&object).unwrap();
        assert_eq!(found.created_at, created.created_at);
        assert_eq!(found.primary_seals.len(), 1);

        let other = ObjectInfo::new(1, 2048, RedundancyType::Inline);
        assert!(matches!(
            db.create_upload_job(&other),
            Err(JobDBError::ObjectMismatch(1))
        ));
    }

    pub(crate) fn seals_and_state<DB: JobDB>(db: &DB) {
        let object = ObjectInfo::new(42, 50 * 1024 * 1024, RedundancyType::ErasureCoded);
        db.create_upload_job(&object).unwrap();

        let first = seal(3, checksums(4));
        db.set_piece_sealed(42, PieceRole::Secondary, &first).unwrap();
        db.set_piece_sealed(42, PieceRole::Primary, &seal(0, checksums(1))).unwrap();

        // Later snapshots for the same piece replace the earlier ones
        let mut second = first.clone();
        second.storage_provider_id = "another-storage-provider".to_string();
        db.set_piece_sealed(42, PieceRole::Secondary, &second).unwrap();

        db.set_job_state(42, JobState::Uploading).unwrap();

        let record = db.get_upload_job(42).unwrap().unwrap();
        assert_eq!(record.state, JobState::Uploading);
        assert!(record.updated_at >= record.created_at);
        assert_eq!(
            record.seals(PieceRole::Primary).keys().copied().collect::<Vec<u32>>(),
            vec![0]
        );
        assert_eq!(record.seals(PieceRole::Secondary).len(), 1);
        assert_eq!(record.seals(PieceRole::Secondary)[&3], second);

        assert!(matches!(
            db.set_job_state(7, JobState::Uploaded),
            Err(JobDBError::NotFound(7))
        ));
        assert!(matches!(
            db.set_piece_sealed(7, PieceRole::Primary, &first),
            Err(JobDBError::NotFound(7))
        ));
    }

    pub(crate) fn list_and_remove<DB: JobDB>(db: &DB) {
        for object_id in [5, 1, 3] {
            db.create_upload_job(&ObjectInfo::new(object_id, 10, RedundancyType::Replica)).unwrap();
            db.set_piece_sealed(object_id, PieceRole::Primary, &seal(0, checksums(1))).unwrap();
        }
        assert_eq!(db.list_upload_jobs().unwrap(), vec![1, 3, 5]);

        db.remove_upload_job(3).unwrap();
        // Removing twice is fine
        db.remove_upload_job(3).unwrap();
        assert_eq!(db.list_upload_jobs().unwrap(), vec![1, 5]);
        assert!(matches!(db.get_upload_job(3), Ok(None)));

        // A job created again starts from scratch
        let record = db
            .create_upload_job(&ObjectInfo::new(3, 10, RedundancyType::Replica))
            .unwrap();
        assert!(record.primary_seals.is_empty());

        // Neighbours are untouched
        assert_eq!(db.get_upload_job(5).unwrap().unwrap().primary_seals.len(), 1);
    }
}
