use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use chrono::Utc;

use super::{JobDB, JobDBError, JobRecord, JobState};
use crate::{
    object::{ObjectId, ObjectInfo, PieceRole},
    piece::SealInfo,
};

/// Volatile [`JobDB`], everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemJobDB {
    jobs: RwLock<HashMap<ObjectId, JobRecord>>,
}

impl MemJobDB {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, object_id: ObjectId, f: F) -> Result<(), JobDBError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let record = jobs
            .get_mut(&object_id)
            .ok_or(JobDBError::NotFound(object_id))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

impl JobDB for MemJobDB {
    fn create_upload_job(&self, object: &ObjectInfo) -> Result<JobRecord, JobDBError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let record = jobs
            .entry(object.object_id)
            .or_insert_with(|| JobRecord::new(*object));
        if record.object != *object {
            return Err(JobDBError::ObjectMismatch(object.object_id));
        }
        Ok(record.clone())
    }

    fn get_upload_job(&self, object_id: ObjectId) -> Result<Option<JobRecord>, JobDBError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&object_id).cloned())
    }

    fn set_job_state(&self, object_id: ObjectId, state: JobState) -> Result<(), JobDBError> {
        self.update(object_id, |record| record.state = state)
    }

    fn set_piece_sealed(
        &self,
        object_id: ObjectId,
        role: PieceRole,
        seal: &SealInfo,
    ) -> Result<(), JobDBError> {
        self.update(object_id, |record| {
            record
                .seals_mut(role)
                .insert(seal.piece_index, seal.clone());
        })
    }

    fn remove_upload_job(&self, object_id: ObjectId) -> Result<(), JobDBError> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&object_id);
        Ok(())
    }

    fn list_upload_jobs(&self) -> Result<Vec<ObjectId>, JobDBError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut object_ids: Vec<_> = jobs.keys().copied().collect();
        object_ids.sort_unstable();
        Ok(object_ids)
    }
}

#[cfg(test)]
mod test {
    use super::MemJobDB;
    use crate::db::tests;

    #[test]
    fn create_or_find() {
        tests::create_or_find(&MemJobDB::new());
    }

    #[test]
    fn seals_and_state() {
        tests::seals_and_state(&MemJobDB::new());
    }

    #[test]
    fn list_and_remove() {
        tests::list_and_remove(&MemJobDB::new());
    }
}
