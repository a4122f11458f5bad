use std::path::Path;

use serde::Serialize;
use upload_job::{
    db::{JobDB, JobDBError, RocksDBJobDB},
    ObjectId, ObjectInfo, PieceRole, SealInfo,
};

use crate::error::Error;

#[derive(Debug, Serialize)]
pub(crate) struct SealedPiece {
    pub index: u32,
    pub storage_provider_id: String,
    pub checksums: usize,
    pub integrity_hash: String,
}

impl SealedPiece {
    fn new(index: u32, seal: &SealInfo) -> Self {
        Self {
            index,
            storage_provider_id: seal.storage_provider_id.clone(),
            checksums: seal.piece_checksums.len(),
            integrity_hash: hex::encode(&seal.integrity_hash),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusReport {
    pub object: ObjectInfo,
    pub state: String,
    pub created_at: String,
    pub updated_at: String,
    pub primary_sealed: Vec<SealedPiece>,
    pub secondary_sealed: Vec<SealedPiece>,
}

/// Read a persisted upload job back from a RocksDB directory.
pub(crate) fn status(
    object_id: ObjectId,
    database_directory: &Path,
) -> Result<StatusReport, Error> {
    if !database_directory.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", database_directory.display()),
        )));
    }
    let db = RocksDBJobDB::new(database_directory)?;
    let record = db
        .get_upload_job(object_id)?
        .ok_or(JobDBError::NotFound(object_id))?;

    let sealed = |role| {
        record
            .seals(role)
            .iter()
            .map(|(index, seal)| SealedPiece::new(*index, seal))
            .collect::<Vec<_>>()
    };

    Ok(StatusReport {
        object: record.object,
        state: format!("{:?}", record.state),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
        primary_sealed: sealed(PieceRole::Primary),
        secondary_sealed: sealed(PieceRole::Secondary),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;
    use upload_job::{
        db::{JobDB, JobDBError, RocksDBJobDB},
        ObjectInfo, PieceRole, RedundancyType, SealInfo,
    };

    use super::status;
    use crate::error::Error;

    #[test]
    fn reports_sealed_pieces() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("jobs");
        {
            let db = Arc::new(RocksDBJobDB::new(&path)?);
            db.create_upload_job(&ObjectInfo::new(7, 1024, RedundancyType::Replica))?;
            db.set_piece_sealed(
                7,
                PieceRole::Secondary,
                &SealInfo {
                    storage_provider_id: "sp-1".to_string(),
                    piece_index: 0,
                    piece_checksums: vec![vec![0; 32]],
                    integrity_hash: vec![0xab, 0xcd],
                    signature: vec![1; 32],
                },
            )?;
        }

        let report = status(7, &path)?;
        assert_eq!(report.state, "Created");
        assert!(report.primary_sealed.is_empty());
        assert_eq!(report.secondary_sealed.len(), 1);
        assert_eq!(report.secondary_sealed[0].storage_provider_id, "sp-1");
        assert_eq!(report.secondary_sealed[0].integrity_hash, "abcd");
        Ok(())
    }

    #[test]
    fn unknown_job() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("jobs");
        drop(RocksDBJobDB::new(&path)?);

        assert!(matches!(
            status(8, &path),
            Err(Error::JobDB(JobDBError::NotFound(8)))
        ));
        assert!(matches!(
            status(8, &temp_dir.path().join("missing")),
            Err(Error::Io(_))
        ));
        Ok(())
    }
}
