use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn};

use crate::capability;
use crate::config::Config;
use crate::db::job_repo::{self, Claim, CompletedFields, NewJob};
use crate::db::Database;
use crate::error::{ConversionError, StorageError};
use crate::format::{self, content_type_for, Format};
use crate::sanitize;
use crate::storage::{ArtifactStore, OutputSlot};
use crate::strategy::{ConversionRequest, StrategyRegistry};
use crate::tools::{ProcessRunner, ToolRunner};

use super::error::JobError;
use super::model::{
    timestamp, ConversionJob, ConversionReceipt, DownloadTarget, HistoryPage, JobStatus,
};

pub const HISTORY_PAGE_SIZE: u64 = 10;

/// Everything the manager needs, constructed explicitly by the caller.
pub struct ConversionContext {
    pub db: Database,
    pub store: ArtifactStore,
    pub strategies: StrategyRegistry,
    /// How long a `processing` claim is honoured before another attempt
    /// may take the job over.
    pub processing_lease: Duration,
}

/// Drives conversion jobs through `pending -> processing -> completed|failed`.
pub struct JobManager {
    ctx: ConversionContext,
}

impl JobManager {
    pub fn new(ctx: ConversionContext) -> Self {
        Self { ctx }
    }

    /// Builds a manager that runs external tools as child processes.
    pub fn from_config(config: &Config, db: Database) -> Result<Self, JobError> {
        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new(
            config.tools.clone(),
            config.tool_timeout(),
        ));
        Self::with_runner(config, db, runner)
    }

    pub fn with_runner(
        config: &Config,
        db: Database,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Self, JobError> {
        let store = ArtifactStore::new(&config.storage_root);
        store.ensure_layout()?;

        Ok(Self::new(ConversionContext {
            db,
            store,
            strategies: StrategyRegistry::new(runner),
            processing_lease: config.processing_lease(),
        }))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.ctx.store
    }

    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    /// Loads a job by id.
    pub fn find(&self, id: i64) -> Result<ConversionJob, JobError> {
        let row = job_repo::find_by_id(&self.ctx.db, id)?.ok_or(JobError::NotFound(id))?;
        Ok(ConversionJob::try_from(row)?)
    }

    /// Stores an uploaded file under a random name and records a `pending` job.
    pub fn register_upload(
        &self,
        source_file: &Path,
        original_filename: &str,
        owner_token: &str,
    ) -> Result<ConversionJob, JobError> {
        let token = original_filename
            .rsplit_once('.')
            .map(|(_, ext)| format::normalize_token(ext))
            .unwrap_or_default();
        let format_from = Format::parse(&token).ok_or(JobError::UnknownFormat(token))?;

        let stored = self.ctx.store.store_original(source_file, format_from)?;
        let new_job = NewJob {
            original_filename: original_filename.to_string(),
            original_path: stored.relative_path.clone(),
            format_from: format_from.extension().to_string(),
            original_size: i64::try_from(stored.size).unwrap_or(i64::MAX),
            owner_token: owner_token.to_string(),
            created_at: timestamp(Utc::now()),
        };

        let id = match job_repo::insert(&self.ctx.db, &new_job) {
            Ok(id) => id,
            Err(e) => {
                let _ = std::fs::remove_file(&stored.absolute_path);
                return Err(e.into());
            }
        };

        info!(
            job_id = id,
            format = %format_from,
            size = stored.size,
            artifact = %sanitize::redact_path(&stored.absolute_path),
            "Registered upload"
        );

        self.find(id)
    }

    /// Runs one conversion attempt for `job_id` into `target`.
    ///
    /// Returns before touching the job when it or its source file is
    /// missing. Otherwise the job is claimed into `processing` first and
    /// always ends `completed` or `failed` before this returns, unless a
    /// concurrent attempt holds it (`InProgress`, job untouched).
    pub fn request_conversion(
        &self,
        job_id: i64,
        target: &str,
    ) -> Result<ConversionReceipt, JobError> {
        let target = format::normalize_token(target);
        let _span = info_span!("conversion", job_id, target = %target).entered();

        let job = self.find(job_id)?;
        let source = match self.ctx.store.original_path(&job.original_path) {
            Ok(path) => path,
            Err(StorageError::PathViolation) => {
                warn!(job_id, "Stored original path escapes the uploads directory");
                return Err(JobError::PathViolation(job_id));
            }
            Err(e) => return Err(e.into()),
        };
        if !source.is_file() {
            return Err(JobError::SourceMissing(job_id));
        }

        let now = Utc::now();
        let claim = job_repo::claim_for_conversion(
            &self.ctx.db,
            job_id,
            &target,
            &timestamp(now),
            &timestamp(self.lease_cutoff(now)),
        )?
        .ok_or(JobError::InProgress(job_id))?;

        info!(
            from = %job.format_from,
            previous = %job.status,
            source = %sanitize::hash_path(&source),
            "Conversion started"
        );

        match self.run_claimed(&job, &source, &target, &claim) {
            Ok(receipt) => {
                info!(
                    strategy = %receipt.strategy,
                    size = receipt.converted_size,
                    "Conversion completed"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.record_failure(&claim, &err);
                Err(err)
            }
        }
    }

    fn lease_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ctx.processing_lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn run_claimed(
        &self,
        job: &ConversionJob,
        source: &Path,
        target: &str,
        claim: &Claim,
    ) -> Result<ConversionReceipt, JobError> {
        let unsupported = || JobError::Unsupported {
            from: job.format_from.clone(),
            to: target.to_string(),
        };
        let from = Format::parse(&job.format_from).ok_or_else(unsupported)?;
        let to = Format::parse(target).ok_or_else(unsupported)?;
        let strategy_id = capability::resolve_formats(from, to).ok_or_else(unsupported)?;
        let strategy = self
            .ctx
            .strategies
            .get(strategy_id)
            .ok_or_else(unsupported)?;

        let work_dir = self.ctx.store.create_work_dir()?;
        let output = strategy
            .convert(&ConversionRequest {
                source,
                from,
                to,
                work_dir: work_dir.path(),
            })
            .map_err(|source| JobError::Conversion {
                strategy: strategy_id,
                source,
            })?;

        let slot = self.ctx.store.allocate_output_path(output.format);
        let stored_failure = |reason: String| JobError::Conversion {
            strategy: strategy_id,
            source: ConversionError::Encode(reason),
        };
        let size = match self.ctx.store.promote(&output.path, &slot) {
            Ok(size) if size > 0 => size,
            Ok(_) => {
                self.ctx.store.discard(&slot);
                return Err(stored_failure("stored output is empty".to_string()));
            }
            Err(e) => {
                self.ctx.store.discard(&slot);
                return Err(stored_failure(format!("output could not be stored: {}", e)));
            }
        };

        let converted_filename = format!(
            "{}.{}",
            sanitize::display_stem(&job.original_filename),
            output.format.extension()
        );

        self.commit(claim, &slot, &converted_filename, size)?;

        Ok(ConversionReceipt {
            job_id: job.id,
            converted_filename,
            converted_size: size,
            format: output.format,
            strategy: strategy_id,
        })
    }

    /// Writes the completed state. The artifact is removed again if no
    /// record ends up referencing it.
    fn commit(
        &self,
        claim: &Claim,
        slot: &OutputSlot,
        converted_filename: &str,
        size: u64,
    ) -> Result<(), JobError> {
        let fields = CompletedFields {
            converted_filename,
            converted_path: &slot.relative_path,
            converted_size: i64::try_from(size).unwrap_or(i64::MAX),
        };

        let written =
            job_repo::mark_completed(&self.ctx.db, claim, &fields, &timestamp(Utc::now()));
        self.release_previous(claim);

        match written {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(job_id = claim.id, "Claim lost before the result was recorded");
                self.ctx.store.discard(slot);
                Err(JobError::InProgress(claim.id))
            }
            Err(e) => {
                self.ctx.store.discard(slot);
                Err(e.into())
            }
        }
    }

    fn record_failure(&self, claim: &Claim, err: &JobError) {
        warn!(
            error_kind = %err.kind(),
            error = %err,
            "Conversion failed"
        );

        let written = job_repo::mark_failed(
            &self.ctx.db,
            claim,
            &err.public_message(),
            &timestamp(Utc::now()),
        );
        self.release_previous(claim);

        match written {
            Ok(true) => {}
            Ok(false) => warn!(job_id = claim.id, "Claim lost before the failure was recorded"),
            Err(e) => warn!(job_id = claim.id, error = %e, "Failed to record conversion failure"),
        }
    }

    /// Removes the result an earlier run left behind. The claim already
    /// cleared it from the record, so no row can reference it again.
    fn release_previous(&self, claim: &Claim) {
        if let Some(previous) = &claim.previous_artifact {
            self.ctx.store.discard_converted(previous);
        }
    }

    /// Resolves the converted file of a `completed` job for serving.
    pub fn resolve_for_download(&self, job_id: i64) -> Result<DownloadTarget, JobError> {
        let job = self.find(job_id)?;
        let artifact = match (job.status, job.converted) {
            (JobStatus::Completed, Some(artifact)) => artifact,
            _ => return Err(JobError::ArtifactMissing(job_id)),
        };

        let absolute_path = match self.ctx.store.resolve_for_download(&artifact.path) {
            Ok(path) => path,
            Err(StorageError::PathViolation) => {
                warn!(job_id, "Download path escapes the converted directory");
                return Err(JobError::PathViolation(job_id));
            }
            Err(StorageError::NotFound(_)) => return Err(JobError::ArtifactMissing(job_id)),
            Err(e) => return Err(e.into()),
        };

        Ok(DownloadTarget {
            absolute_path,
            content_type: content_type_for(&artifact.filename),
            suggested_filename: artifact.filename,
        })
    }

    /// An owner's jobs, newest first, [`HISTORY_PAGE_SIZE`] per page.
    /// Pages are 1-based; page 0 is treated as page 1.
    pub fn history(&self, owner_token: &str, page: u64) -> Result<HistoryPage, JobError> {
        let page = page.max(1);
        let offset = (page - 1).saturating_mul(HISTORY_PAGE_SIZE);
        let (rows, total) =
            job_repo::list_by_owner(&self.ctx.db, owner_token, HISTORY_PAGE_SIZE, offset)?;

        let items = rows
            .into_iter()
            .map(ConversionJob::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryPage {
            items,
            current_page: page,
            total_pages: total.div_ceil(HISTORY_PAGE_SIZE),
            total_items: total,
        })
    }
}
