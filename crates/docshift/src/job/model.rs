use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::StrategyId;
use crate::db::job_repo::{self, JobRow};
use crate::db::DatabaseError;
use crate::format::Format;

use super::error::{ErrorKind, JobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => job_repo::STATUS_PENDING,
            JobStatus::Processing => job_repo::STATUS_PROCESSING,
            JobStatus::Completed => job_repo::STATUS_COMPLETED,
            JobStatus::Failed => job_repo::STATUS_FAILED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            job_repo::STATUS_PENDING => Some(JobStatus::Pending),
            job_repo::STATUS_PROCESSING => Some(JobStatus::Processing),
            job_repo::STATUS_COMPLETED => Some(JobStatus::Completed),
            job_repo::STATUS_FAILED => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The output of a completed conversion. Present only on `completed` jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedArtifact {
    pub filename: String,
    /// Relative to the storage root; resolved through the artifact store.
    #[serde(skip_serializing)]
    pub path: String,
    pub size: u64,
}

/// One upload-to-download lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub id: i64,
    pub original_filename: String,
    #[serde(skip_serializing)]
    pub original_path: String,
    /// Normalized extension token of the upload.
    pub format_from: String,
    pub format_to: Option<String>,
    pub original_size: u64,
    pub status: JobStatus,
    pub converted: Option<ConvertedArtifact>,
    /// Client-safe message of the last failed attempt.
    pub error: Option<String>,
    #[serde(skip_serializing)]
    pub owner_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Timestamps are stored as RFC 3339 UTC with millisecond precision, which
/// sorts lexicographically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(id: i64, column: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            id,
            reason: format!("{} '{}': {}", column, value, e),
        })
}

fn non_negative(id: i64, column: &str, value: i64) -> Result<u64, DatabaseError> {
    u64::try_from(value).map_err(|_| DatabaseError::CorruptRow {
        id,
        reason: format!("{} is negative", column),
    })
}

impl TryFrom<JobRow> for ConversionJob {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::CorruptRow {
            id,
            reason: format!("unknown status '{}'", row.status),
        })?;

        let converted = match (row.converted_filename, row.converted_path, row.converted_size) {
            (Some(filename), Some(path), Some(size)) => Some(ConvertedArtifact {
                filename,
                path,
                size: non_negative(id, "converted_size", size)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(DatabaseError::CorruptRow {
                    id,
                    reason: "converted fields are partially set".to_string(),
                })
            }
        };

        Ok(Self {
            id,
            original_filename: row.original_filename,
            original_path: row.original_path,
            format_from: row.format_from,
            format_to: row.format_to,
            original_size: non_negative(id, "original_size", row.original_size)?,
            status,
            converted,
            error: row.error,
            owner_token: row.owner_token,
            created_at: parse_timestamp(id, "created_at", &row.created_at)?,
            updated_at: parse_timestamp(id, "updated_at", &row.updated_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(|v| parse_timestamp(id, "completed_at", v))
                .transpose()?,
        })
    }
}

/// What a successful `request_conversion` hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionReceipt {
    pub job_id: i64,
    pub converted_filename: String,
    pub converted_size: u64,
    /// The produced format; may differ from the requested token.
    pub format: Format,
    pub strategy: StrategyId,
}

/// The response contract for a request-handling collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConversionResponse {
    pub fn from_result(result: &Result<ConversionReceipt, JobError>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                converted_filename: Some(receipt.converted_filename.clone()),
                converted_size: Some(receipt.converted_size),
                error_kind: None,
                message: None,
            },
            Err(err) => Self {
                success: false,
                converted_filename: None,
                converted_size: None,
                error_kind: Some(err.kind()),
                message: Some(err.public_message()),
            },
        }
    }

    pub fn status_code(&self) -> u16 {
        self.error_kind.map(ErrorKind::status_code).unwrap_or(200)
    }
}

/// A converted file ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub absolute_path: PathBuf,
    pub suggested_filename: String,
    pub content_type: &'static str,
}

/// One page of an owner's conversion history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<ConversionJob>,
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
}
