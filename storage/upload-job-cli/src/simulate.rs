use std::{env::temp_dir, path::PathBuf, sync::Arc, time::Duration};

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use upload_job::{
    db::{JobDB, JobState, RocksDBJobDB},
    JobContext, ObjectId, ObjectInfo, PieceConfirmation, PieceRole, PieceSlot, RedundancyType,
    SealInfo, UploadPayloadJob,
};

use crate::{error::Error, load_config};

/// Upper bound for the simulated provider response time, in milliseconds.
const MAX_PROVIDER_DELAY_MS: u64 = 50;

type Job = UploadPayloadJob<RocksDBJobDB>;

#[derive(Debug, clap::Args)]
pub(crate) struct SimulateArguments {
    #[arg(long)]
    object_id: ObjectId,

    /// Payload size, in bytes
    #[arg(long)]
    size: u64,

    #[arg(long, value_enum, default_value_t)]
    redundancy: RedundancyType,

    /// JSON file overriding the default upload configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// RocksDB storage directory.
    /// Defaults to a temporary random directory, like `/tmp/<random>`.
    #[arg(long)]
    database_directory: Option<PathBuf>,

    /// How many extra times every confirmation is delivered.
    #[arg(long, default_value_t = 0)]
    duplicates: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct Summary {
    pub object_id: ObjectId,
    pub database_directory: PathBuf,
    pub state: String,
    pub primary_pending: Vec<u32>,
    pub secondary_pending: Vec<u32>,
}

fn get_random_temporary_folder() -> PathBuf {
    temp_dir().join(
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(7)
            .map(char::from)
            .collect::<String>(),
    )
}

/// Act as the orchestrator of a single upload: dispatch every pending piece to a simulated
/// provider, apply its confirmation and persist the seal.
#[tracing::instrument(skip_all, fields(object_id = arguments.object_id))]
pub(crate) async fn simulate(arguments: SimulateArguments) -> Result<Summary, Error> {
    let config = load_config(arguments.config.as_deref())?;
    let database_directory = arguments
        .database_directory
        .unwrap_or_else(get_random_temporary_folder);
    tracing::info!("using database at {}", database_directory.display());

    let db = Arc::new(RocksDBJobDB::new(&database_directory)?);
    let object = ObjectInfo::new(arguments.object_id, arguments.size, arguments.redundancy);
    let job = Arc::new(UploadPayloadJob::new(
        JobContext::new(object, db.clone()).with_config(config),
    )?);
    db.set_job_state(object.object_id, JobState::Uploading)?;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received Ctrl-C, abandoning the upload...");
                token.cancel();
            }
        });
    }

    let tracker = TaskTracker::new();
    for role in [PieceRole::Primary, PieceRole::Secondary] {
        for slot in job.piece_set(role).pending() {
            let job = job.clone();
            let token = token.clone();
            let duplicates = arguments.duplicates;
            tracker.spawn(async move {
                tokio::select! {
                    res = seal_piece(job, role, slot, duplicates) => {
                        if let Err(err) = res {
                            tracing::error!(%err);
                        }
                    },
                    () = token.cancelled() => {
                        tracing::warn!("Sealing has been cancelled.");
                    }
                }
            });
        }
    }

    tracker.close();
    tracker.wait().await;

    let state = if job.completed() {
        JobState::Uploaded
    } else {
        JobState::Abandoned
    };
    db.set_job_state(object.object_id, state)?;
    tracing::info!(?state, "upload finished");

    Ok(Summary {
        object_id: object.object_id,
        database_directory,
        state: format!("{:?}", state),
        primary_pending: job.primary().pending_indices(),
        secondary_pending: job.secondary().pending_indices(),
    })
}

#[tracing::instrument(skip_all, fields(%role, piece_index = slot.index()))]
async fn seal_piece(
    job: Arc<Job>,
    role: PieceRole,
    slot: PieceSlot,
    duplicates: u32,
) -> Result<(), Error> {
    // Providers answer after a random delay, so confirmations arrive out of order
    let delay = rand::thread_rng().gen_range(0..=MAX_PROVIDER_DELAY_MS);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let confirmation = provider_confirmation(&job, role, &slot);
    for _ in 0..=duplicates {
        match role {
            PieceRole::Primary => job.done_primary(&confirmation)?,
            PieceRole::Secondary => job.done_secondary(&confirmation)?,
        }
    }

    job.context()
        .db()
        .set_piece_sealed(job.object().object_id, role, &confirmation.seal)?;

    Ok(())
}

/// Build the confirmation a well behaved provider would send for the given slot.
fn provider_confirmation(job: &Job, role: PieceRole, slot: &PieceSlot) -> PieceConfirmation {
    let object = job.object();
    let checksum_length = job.context().config().checksum_length;
    let digest = |data: String| {
        let mut digest = Sha256::digest(data.as_bytes()).to_vec();
        digest.resize(checksum_length, 0);
        digest
    };

    let piece_checksums = (0..slot.expected_checksums())
        .map(|segment| {
            digest(format!(
                "{}/{role}/{}/{segment}",
                object.object_id,
                slot.index()
            ))
        })
        .collect::<Vec<_>>();
    let integrity_hash = digest(
        piece_checksums
            .iter()
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(""),
    );

    PieceConfirmation::new(
        object,
        SealInfo {
            storage_provider_id: format!("sp-{role}-{}", slot.index()),
            piece_index: slot.index(),
            piece_checksums,
            signature: digest(format!("signature:{}", hex::encode(&integrity_hash))),
            integrity_hash,
        },
    )
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;
    use upload_job::RedundancyType;

    use super::{simulate, SimulateArguments};
    use crate::status::status;

    fn arguments(
        object_id: u64,
        size: u64,
        redundancy: RedundancyType,
        database_directory: std::path::PathBuf,
    ) -> SimulateArguments {
        SimulateArguments {
            object_id,
            size,
            redundancy,
            config: None,
            database_directory: Some(database_directory),
            duplicates: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn erasure_coded_upload_completes() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_directory = temp_dir.path().join("jobs");

        let summary = simulate(arguments(
            1,
            50 * 1024 * 1024,
            RedundancyType::ErasureCoded,
            database_directory.clone(),
        ))
        .await?;
        assert_eq!(summary.state, "Uploaded");
        assert!(summary.primary_pending.is_empty());
        assert!(summary.secondary_pending.is_empty());

        let report = status(1, &database_directory)?;
        assert_eq!(report.state, "Uploaded");
        assert_eq!(report.primary_sealed.len(), 4);
        assert_eq!(report.secondary_sealed.len(), 6);
        assert!(report.secondary_sealed.iter().all(|piece| piece.checksums == 4));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rerun_resumes_finished_job() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_directory = temp_dir.path().join("jobs");

        let args = || arguments(2, 1024, RedundancyType::Inline, database_directory.clone());
        simulate(args()).await?;
        // Nothing is pending anymore, so no piece gets dispatched again
        let summary = simulate(args()).await?;
        assert_eq!(summary.state, "Uploaded");
        Ok(())
    }
}
