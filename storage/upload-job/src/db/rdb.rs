// The name of this file is `rdb.rs` to avoid clashing with the `rocksdb` import.
use std::{
    path::Path,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    DB as RocksDB,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{JobDB, JobDBError, JobRecord, JobState};
use crate::{
    object::{ObjectId, ObjectInfo, PieceRole},
    piece::SealInfo,
};

/// Column family name to store the job metadata, keyed by the big endian object id.
pub const UPLOAD_JOBS_CF: &str = "upload_jobs";

/// Column family name to store the seal snapshots.
///
/// Keys are `<object id><role><piece index>`, integers in big endian, so that all seals
/// of an object are contiguous and sorted by role and index.
pub const PIECE_SEALS_CF: &str = "piece_seals";

const COLUMN_FAMILIES: [&str; 2] = [UPLOAD_JOBS_CF, PIECE_SEALS_CF];

const SEAL_KEY_LENGTH: usize = 8 + 1 + 4;

fn job_key(object_id: ObjectId) -> [u8; 8] {
    object_id.to_be_bytes()
}

fn role_byte(role: PieceRole) -> u8 {
    match role {
        PieceRole::Primary => 0,
        PieceRole::Secondary => 1,
    }
}

fn seal_key(object_id: ObjectId, role: PieceRole, piece_index: u32) -> [u8; SEAL_KEY_LENGTH] {
    let mut key = [0u8; SEAL_KEY_LENGTH];
    key[..8].copy_from_slice(&job_key(object_id));
    key[8] = role_byte(role);
    key[9..].copy_from_slice(&piece_index.to_be_bytes());
    key
}

/// Serialize a value to CBOR.
fn serialize<Value>(value: &Value) -> Result<Vec<u8>, JobDBError>
where
    Value: Serialize,
{
    let mut serialized = Vec::new();
    if let Err(err) = ciborium::into_writer(value, &mut serialized) {
        return Err(JobDBError::Serialization(err.to_string()));
    }
    Ok(serialized)
}

/// Everything in [`JobRecord`] but the seals, which live in [`PIECE_SEALS_CF`].
#[derive(Debug, Serialize, Deserialize)]
struct JobMetadata {
    object: ObjectInfo,
    state: JobState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A [`JobDB`] implementation backed by RocksDB.
pub struct RocksDBJobDB {
    database: RocksDB,
    /// Serializes the read-modify-write cycles over the job metadata.
    write_lock: Mutex<()>,
}

impl RocksDBJobDB {
    /// Open the database at the provided path.
    ///
    /// * If the database does not exist in the path, it will be created.
    /// * If the column families ([`UPLOAD_JOBS_CF`], [`PIECE_SEALS_CF`]) do not exist, they will be created.
    pub fn new<P>(path: P) -> Result<Self, JobDBError>
    where
        P: AsRef<Path>,
    {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = COLUMN_FAMILIES
            .into_iter()
            .map(|cf_name| ColumnFamilyDescriptor::new(cf_name, Options::default()));

        Ok(Self {
            database: RocksDB::open_cf_descriptors(&opts, path, cfs)?,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the column family handle for the given column family name.
    ///
    /// **Invariant**: The column family name MUST exist. *Otherwise this function will panic.*
    #[track_caller]
    fn cf_handle(&self, cf_name: &str) -> &ColumnFamily {
        self.database
            .cf_handle(cf_name)
            .expect("column family should have been initialized on database startup")
    }

    /// Get value at the specified key in the specified column family.
    fn get_value_at_key<Key, Value>(
        &self,
        key: Key,
        cf_name: &str,
    ) -> Result<Option<Value>, JobDBError>
    where
        Key: AsRef<[u8]>,
        Value: DeserializeOwned,
    {
        let Some(slice) = self.database.get_pinned_cf(self.cf_handle(cf_name), key)? else {
            return Ok(None);
        };

        match ciborium::from_reader(slice.as_ref()) {
            Ok(value) => Ok(Some(value)),
            // ciborium's error is generic, so it's bubbled up as a string
            Err(err) => Err(JobDBError::Deserialization(err.to_string())),
        }
    }

    /// Serializes the `Value` to CBOR and puts resulting bytes at the specified key in the specified column family.
    fn put_value_at_key<Key, Value>(
        &self,
        key: Key,
        value: &Value,
        cf_name: &str,
    ) -> Result<(), JobDBError>
    where
        Key: AsRef<[u8]>,
        Value: Serialize,
    {
        Ok(self
            .database
            .put_cf(self.cf_handle(cf_name), key, serialize(value)?)?)
    }

    fn get_metadata(&self, object_id: ObjectId) -> Result<Option<JobMetadata>, JobDBError> {
        self.get_value_at_key(job_key(object_id), UPLOAD_JOBS_CF)
    }

    fn update_metadata<F>(&self, object_id: ObjectId, f: F) -> Result<(), JobDBError>
    where
        F: FnOnce(&mut JobMetadata),
    {
        let Some(mut metadata) = self.get_metadata(object_id)? else {
            return Err(JobDBError::NotFound(object_id));
        };
        f(&mut metadata);
        metadata.updated_at = Utc::now();
        self.put_value_at_key(job_key(object_id), &metadata, UPLOAD_JOBS_CF)
    }

    /// Assemble the full [`JobRecord`] by collecting the seals stored under the object's prefix.
    fn load_record(&self, metadata: JobMetadata) -> Result<JobRecord, JobDBError> {
        let prefix = job_key(metadata.object.object_id);
        let mut record = JobRecord {
            object: metadata.object,
            state: metadata.state,
            created_at: metadata.created_at,
            updated_at: metadata.updated_at,
            primary_seals: Default::default(),
            secondary_seals: Default::default(),
        };

        let iterator = self.database.iterator_cf(
            self.cf_handle(PIECE_SEALS_CF),
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iterator {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let role = match key.get(8).copied() {
                Some(0) => PieceRole::Primary,
                Some(1) => PieceRole::Secondary,
                _ => {
                    return Err(JobDBError::Deserialization(format!(
                        "invalid seal key: {:?}",
                        key
                    )))
                }
            };
            let seal: SealInfo = ciborium::from_reader(value.as_ref())
                .map_err(|err| JobDBError::Deserialization(err.to_string()))?;
            record.seals_mut(role).insert(seal.piece_index, seal);
        }

        Ok(record)
    }
}

impl JobDB for RocksDBJobDB {
    fn create_upload_job(&self, object: &ObjectInfo) -> Result<JobRecord, JobDBError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(metadata) = self.get_metadata(object.object_id)? {
            if metadata.object != *object {
                return Err(JobDBError::ObjectMismatch(object.object_id));
            }
            return self.load_record(metadata);
        }

        let record = JobRecord::new(*object);
        let metadata = JobMetadata {
            object: record.object,
            state: record.state,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        self.put_value_at_key(job_key(object.object_id), &metadata, UPLOAD_JOBS_CF)?;
        tracing::debug!(object_id = object.object_id, "created upload job record");

        Ok(record)
    }

    fn get_upload_job(&self, object_id: ObjectId) -> Result<Option<JobRecord>, JobDBError> {
        self.get_metadata(object_id)?
            .map(|metadata| self.load_record(metadata))
            .transpose()
    }

    fn set_job_state(&self, object_id: ObjectId, state: JobState) -> Result<(), JobDBError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.update_metadata(object_id, |metadata| metadata.state = state)
    }

    fn set_piece_sealed(
        &self,
        object_id: ObjectId,
        role: PieceRole,
        seal: &SealInfo,
    ) -> Result<(), JobDBError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut metadata) = self.get_metadata(object_id)? else {
            return Err(JobDBError::NotFound(object_id));
        };
        metadata.updated_at = Utc::now();

        // The seal and the metadata touch land together or not at all
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf_handle(UPLOAD_JOBS_CF),
            job_key(object_id),
            serialize(&metadata)?,
        );
        batch.put_cf(
            self.cf_handle(PIECE_SEALS_CF),
            seal_key(object_id, role, seal.piece_index),
            serialize(seal)?,
        );
        Ok(self.database.write(batch)?)
    }

    fn remove_upload_job(&self, object_id: ObjectId) -> Result<(), JobDBError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let prefix = job_key(object_id);
        // Sorts after every `<prefix><role><index>` key
        let mut range_end = prefix.to_vec();
        range_end.push(u8::MAX);

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf_handle(UPLOAD_JOBS_CF), prefix);
        batch.delete_range_cf(self.cf_handle(PIECE_SEALS_CF), prefix.to_vec(), range_end);
        Ok(self.database.write(batch)?)
    }

    fn list_upload_jobs(&self) -> Result<Vec<ObjectId>, JobDBError> {
        self.database
            .iterator_cf(self.cf_handle(UPLOAD_JOBS_CF), IteratorMode::Start)
            .map(|item| {
                let (key, _) = item?;
                let key: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    // Keys are always written by `job_key`,
                    // this only happens if the database was modified from the outside
                    JobDBError::Deserialization(format!("invalid job key: {:?}", key))
                })?;
                Ok(ObjectId::from_be_bytes(key))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use tempfile::{tempdir, TempDir};

    use super::{seal_key, RocksDBJobDB, PIECE_SEALS_CF};
    use crate::{
        db::{tests, JobDB, JobDBError, JobState},
        fixtures::{checksums, seal},
        object::{ObjectInfo, PieceRole, RedundancyType},
    };

    fn init_database() -> (TempDir, RocksDBJobDB) {
        let tmp_dir = tempdir().unwrap();
        let db = RocksDBJobDB::new(tmp_dir.path().join("rocksdb")).unwrap();
        (tmp_dir, db)
    }

    #[test]
    fn seal_keys_sort_by_object_role_and_index() {
        let mut keys = vec![
            seal_key(2, PieceRole::Primary, 0),
            seal_key(1, PieceRole::Secondary, 0),
            seal_key(1, PieceRole::Primary, 256),
            seal_key(1, PieceRole::Primary, 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                seal_key(1, PieceRole::Primary, 3),
                seal_key(1, PieceRole::Primary, 256),
                seal_key(1, PieceRole::Secondary, 0),
                seal_key(2, PieceRole::Primary, 0),
            ]
        );
    }

    #[test]
    fn create_or_find() {
        let (_dir, db) = init_database();
        tests::create_or_find(&db);
    }

    #[test]
    fn seals_and_state() {
        let (_dir, db) = init_database();
        tests::seals_and_state(&db);
    }

    #[test]
    fn list_and_remove() {
        let (_dir, db) = init_database();
        tests::list_and_remove(&db);
    }

    #[test]
    fn seal_and_metadata_written_together() {
        let (_dir, db) = init_database();
        let object = ObjectInfo::new(3, 50 * 1024 * 1024, RedundancyType::Replica);
        let created = db.create_upload_job(&object).unwrap();

        db.set_piece_sealed(3, PieceRole::Primary, &seal(2, checksums(1))).unwrap();
        let record = db.get_upload_job(3).unwrap().unwrap();
        assert!(record.updated_at > created.updated_at);
        assert_eq!(record.primary_seals[&2], seal(2, checksums(1)));

        // Unknown jobs get neither a seal nor a metadata entry
        assert!(matches!(
            db.set_piece_sealed(4, PieceRole::Primary, &seal(0, checksums(1))),
            Err(JobDBError::NotFound(4))
        ));
        let stored = db
            .database
            .get_cf(db.cf_handle(PIECE_SEALS_CF), seal_key(4, PieceRole::Primary, 0))
            .unwrap();
        assert!(stored.is_none());
        assert!(db.get_upload_job(4).unwrap().is_none());
    }

    /// Ensure the records survive closing and reopening the database.
    #[test]
    fn reopen() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("rocksdb");
        let object = ObjectInfo::new(9, 50 * 1024 * 1024, RedundancyType::ErasureCoded);
        let sealed = seal(5, checksums(4));

        {
            let db = RocksDBJobDB::new(&path).unwrap();
            db.create_upload_job(&object).unwrap();
            db.set_piece_sealed(9, PieceRole::Secondary, &sealed).unwrap();
            db.set_job_state(9, JobState::Uploading).unwrap();
        }

        let db = RocksDBJobDB::new(&path).unwrap();
        let record = db.get_upload_job(9).unwrap().unwrap();
        assert_eq!(record.object, object);
        assert_eq!(record.state, JobState::Uploading);
        assert!(record.primary_seals.is_empty());
        assert_eq!(record.secondary_seals[&5], sealed);
    }
}
