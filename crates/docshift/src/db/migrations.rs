//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_conversions_table",
        sql: include_str!("sql/001_create_conversions.sql"),
    },
    Migration {
        version: 2,
        description: "add_conversion_indexes",
        sql: include_str!("sql/002_conversion_indexes.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        conn
    }

    fn insert_sql(extra_cols: &str, extra_vals: &str) -> String {
        format!(
            "INSERT INTO conversions (original_filename, original_path, format_from,
             original_size, owner_token, created_at, updated_at{})
             VALUES ('a.png', 'uploads/x.png', 'png', 3, 'o', 't', 't'{})",
            extra_cols, extra_vals
        )
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_new_rows_default_to_pending() {
        let conn = fresh();
        conn.execute(&insert_sql("", ""), []).unwrap();
        let status: String = conn
            .query_row("SELECT status FROM conversions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "pending");
    }

    #[test]
    fn test_unknown_status_rejected() {
        let conn = fresh();
        assert!(conn
            .execute(&insert_sql(", status", ", 'queued'"), [])
            .is_err());
    }

    #[test]
    fn test_partial_converted_fields_rejected() {
        let conn = fresh();
        let result = conn.execute(
            &insert_sql(
                ", status, converted_path",
                ", 'completed', 'converted/x.pdf'",
            ),
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_converted_fields_only_on_completed() {
        let conn = fresh();
        let result = conn.execute(
            &insert_sql(
                ", status, converted_filename, converted_path, converted_size",
                ", 'failed', 'a.pdf', 'converted/x.pdf', 10",
            ),
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(&insert_sql(", status", ", 'completed'"), []);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_from_is_immutable() {
        let conn = fresh();
        conn.execute(&insert_sql("", ""), []).unwrap();
        assert!(conn
            .execute("UPDATE conversions SET format_from = 'jpg'", [])
            .is_err());
        // Rewriting the same value is harmless.
        conn.execute("UPDATE conversions SET format_from = 'png'", [])
            .unwrap();
    }
}
