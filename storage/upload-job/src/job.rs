use std::sync::Arc;

use crate::{
    config::UploadConfig,
    db::JobDB,
    error::{ConfirmationError, JobError},
    layout::PayloadLayout,
    object::{ObjectInfo, PieceRole},
    piece::PieceConfirmation,
    piece_set::PieceSetJob,
};

/// Everything an [`UploadPayloadJob`] is built from.
pub struct JobContext<DB> {
    object: ObjectInfo,
    config: UploadConfig,
    db: Arc<DB>,
}

impl<DB> JobContext<DB>
where
    DB: JobDB,
{
    /// Create a context using the default [`UploadConfig`].
    pub fn new(object: ObjectInfo, db: Arc<DB>) -> Self {
        Self {
            object,
            config: UploadConfig::default(),
            db,
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn object(&self) -> &ObjectInfo {
        &self.object
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }
}

/// Tracks the sealing confirmations of every piece of one object.
///
/// The primary and secondary pieces are locked independently,
/// the job can be shared between tasks behind an [`Arc`].
pub struct UploadPayloadJob<DB> {
    context: JobContext<DB>,
    layout: PayloadLayout,
    primary: PieceSetJob,
    secondary: PieceSetJob,
}

impl<DB> UploadPayloadJob<DB>
where
    DB: JobDB,
{
    /// Build the job for the context's object.
    ///
    /// The job record is created in the context's database, or found if it already exists,
    /// in which case the persisted seals are applied again so that tracking resumes where it stopped.
    #[tracing::instrument(skip_all, fields(object_id = context.object().object_id))]
    pub fn new(context: JobContext<DB>) -> Result<Self, JobError> {
        let object = *context.object();
        let layout = PayloadLayout::for_object(&object, context.config())?;
        let policy = context.config().digest_policy();

        let record = context.db().create_upload_job(&object)?;

        let job = Self {
            primary: PieceSetJob::new(object, PieceRole::Primary, &layout.primary, policy),
            secondary: PieceSetJob::new(object, PieceRole::Secondary, &layout.secondary, policy),
            context,
            layout,
        };

        for role in [PieceRole::Primary, PieceRole::Secondary] {
            for (index, seal) in record.seals(role) {
                job.piece_set(role)
                    .done(&PieceConfirmation::new(&object, seal.clone()))
                    .map_err(|source| JobError::Resume {
                        role,
                        index: *index,
                        source,
                    })?;
            }
        }

        tracing::debug!(
            redundancy_type = %object.redundancy_type,
            size = object.size,
            primary_pending = job.primary.pending_count(),
            secondary_pending = job.secondary.pending_count(),
            "upload job ready"
        );

        Ok(job)
    }

    pub fn context(&self) -> &JobContext<DB> {
        &self.context
    }

    pub fn object(&self) -> &ObjectInfo {
        self.context.object()
    }

    pub fn layout(&self) -> &PayloadLayout {
        &self.layout
    }

    pub fn primary(&self) -> &PieceSetJob {
        &self.primary
    }

    pub fn secondary(&self) -> &PieceSetJob {
        &self.secondary
    }

    pub fn piece_set(&self, role: PieceRole) -> &PieceSetJob {
        match role {
            PieceRole::Primary => &self.primary,
            PieceRole::Secondary => &self.secondary,
        }
    }

    /// Apply a confirmation sent by a primary storage provider.
    pub fn done_primary(&self, confirmation: &PieceConfirmation) -> Result<(), ConfirmationError> {
        self.primary.done(confirmation)
    }

    /// Apply a confirmation sent by a secondary storage provider.
    pub fn done_secondary(
        &self,
        confirmation: &PieceConfirmation,
    ) -> Result<(), ConfirmationError> {
        self.secondary.done(confirmation)
    }

    /// Whether every primary and secondary piece has been sealed.
    pub fn completed(&self) -> bool {
        self.primary.completed() && self.secondary.completed()
    }
}
