//! Conversion repository: operations on the `conversions` table.
//!
//! Status changes are conditional updates. `claim_for_conversion` is the only
//! way into `processing`, and the terminal writes only apply to the attempt
//! that holds the claim.

use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::{Database, DatabaseError};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

/// A raw conversion row from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: i64,
    pub original_filename: String,
    pub original_path: String,
    pub format_from: String,
    pub format_to: Option<String>,
    pub original_size: i64,
    pub status: String,
    pub converted_filename: Option<String>,
    pub converted_path: Option<String>,
    pub converted_size: Option<i64>,
    pub error: Option<String>,
    pub owner_token: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            original_filename: row.get("original_filename")?,
            original_path: row.get("original_path")?,
            format_from: row.get("format_from")?,
            format_to: row.get("format_to")?,
            original_size: row.get("original_size")?,
            status: row.get("status")?,
            converted_filename: row.get("converted_filename")?,
            converted_path: row.get("converted_path")?,
            converted_size: row.get("converted_size")?,
            error: row.get("error")?,
            owner_token: row.get("owner_token")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Fields supplied by the upload step.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub original_filename: String,
    pub original_path: String,
    pub format_from: String,
    pub original_size: i64,
    pub owner_token: String,
    pub created_at: String,
}

/// Proof that the caller owns the current `processing` attempt.
///
/// `claimed_at` is the `updated_at` value written by the claim; terminal
/// writes match on it so a superseded attempt cannot overwrite a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub id: i64,
    pub claimed_at: String,
    /// `converted_path` of the earlier attempt that this claim cleared.
    /// Nothing references that file any more once the claim reaches a
    /// terminal state.
    pub previous_artifact: Option<String>,
}

/// Converted fields, written together with the `completed` status.
#[derive(Debug, Clone)]
pub struct CompletedFields<'a> {
    pub converted_filename: &'a str,
    pub converted_path: &'a str,
    pub converted_size: i64,
}

/// Inserts a new `pending` row and returns its id.
pub fn insert(db: &Database, job: &NewJob) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO conversions (original_filename, original_path, format_from,
             original_size, status, owner_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                job.original_filename,
                job.original_path,
                job.format_from,
                job.original_size,
                STATUS_PENDING,
                job.owner_token,
                job.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a row by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM conversions WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Moves a row into `processing` for `format_to`, clearing the result of any
/// earlier attempt.
///
/// Succeeds for `pending`, `completed` and `failed` rows, and for
/// `processing` rows whose last update is older than `stale_before`.
/// Returns `None` when a live attempt holds the row (or the row is gone).
pub fn claim_for_conversion(
    db: &Database,
    id: i64,
    format_to: &str,
    now: &str,
    stale_before: &str,
) -> Result<Option<Claim>, DatabaseError> {
    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        let previous_artifact: Option<String> = tx
            .query_row(
                "SELECT converted_path FROM conversions WHERE id = ?1",
                params![id],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();

        let changed = tx.execute(
            "UPDATE conversions
             SET status = ?2, format_to = ?3, converted_filename = NULL,
                 converted_path = NULL, converted_size = NULL, error = NULL,
                 completed_at = NULL, updated_at = ?4
             WHERE id = ?1 AND (status != ?2 OR updated_at < ?5)",
            params![id, STATUS_PROCESSING, format_to, now, stale_before],
        )?;
        tx.commit()?;

        Ok((changed == 1).then(|| Claim {
            id,
            claimed_at: now.to_string(),
            previous_artifact,
        }))
    })
}

/// Records a successful attempt. Returns `false` if the claim was lost.
pub fn mark_completed(
    db: &Database,
    claim: &Claim,
    fields: &CompletedFields<'_>,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE conversions
             SET status = ?3, converted_filename = ?4, converted_path = ?5,
                 converted_size = ?6, error = NULL, updated_at = ?7, completed_at = ?7
             WHERE id = ?1 AND status = ?8 AND updated_at = ?2",
            params![
                claim.id,
                claim.claimed_at,
                STATUS_COMPLETED,
                fields.converted_filename,
                fields.converted_path,
                fields.converted_size,
                now,
                STATUS_PROCESSING,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Records a failed attempt with all converted fields cleared.
/// Returns `false` if the claim was lost.
pub fn mark_failed(
    db: &Database,
    claim: &Claim,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE conversions
             SET status = ?3, converted_filename = NULL, converted_path = NULL,
                 converted_size = NULL, error = ?4, updated_at = ?5, completed_at = ?5
             WHERE id = ?1 AND status = ?6 AND updated_at = ?2",
            params![
                claim.id,
                claim.claimed_at,
                STATUS_FAILED,
                error,
                now,
                STATUS_PROCESSING,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Lists an owner's rows, newest first, returning (rows, total_count).
pub fn list_by_owner(
    db: &Database,
    owner_token: &str,
    limit: u64,
    offset: u64,
) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM conversions WHERE owner_token = ?1",
            params![owner_token],
            |r| r.get(0),
        )?;

        // SQLite reads a negative OFFSET as 0; anything past i64 is past the end.
        let (Ok(limit), Ok(offset)) = (i64::try_from(limit), i64::try_from(offset)) else {
            return Ok((Vec::new(), total));
        };

        let mut stmt = conn.prepare(
            "SELECT * FROM conversions WHERE owner_token = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![owner_token, limit, offset], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}
