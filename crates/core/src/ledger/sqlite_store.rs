//! SQLite-backed ledger implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

use super::{
    CreateJobRequest, Job, JobFilter, JobKind, JobLedger, JobState, LedgerError, SegmentDescriptor,
};

/// SQLite-backed job ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Create a new SQLite ledger, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| LedgerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                source TEXT NOT NULL,
                idempotency_key TEXT UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS segments (
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                path TEXT NOT NULL,
                duration_secs REAL NOT NULL,
                size_bytes INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                PRIMARY KEY (job_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str().to_string()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let state_str: String = row.get(2)?;
        let source: String = row.get(3)?;
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;
        let error: Option<String> = row.get(6)?;

        let kind = JobKind::parse(&kind_str)
            .ok_or_else(|| Self::column_error(1, format!("unknown job kind: {kind_str}")))?;
        let state = JobState::parse(&state_str)
            .ok_or_else(|| Self::column_error(2, format!("unknown job state: {state_str}")))?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Job {
            id,
            kind,
            state,
            source,
            created_at,
            updated_at,
            error,
            manifest: Vec::new(),
        })
    }

    fn column_error(idx: usize, msg: String) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(msg)),
        )
    }

    fn load_manifest(conn: &Connection, job_id: &str) -> Result<Vec<SegmentDescriptor>, LedgerError> {
        let mut stmt = conn
            .prepare(
                "SELECT seq, path, duration_secs, size_bytes, checksum \
                 FROM segments WHERE job_id = ? ORDER BY seq ASC",
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok(SegmentDescriptor {
                    seq: row.get(0)?,
                    path: std::path::PathBuf::from(row.get::<_, String>(1)?),
                    duration_secs: row.get(2)?,
                    size_bytes: row.get(3)?,
                    checksum: row.get(4)?,
                })
            })
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut manifest = Vec::new();
        for row_result in rows {
            manifest.push(row_result.map_err(|e| LedgerError::Database(e.to_string()))?);
        }
        Ok(manifest)
    }

    fn fetch_job(conn: &Connection, id: &str) -> Result<Option<Job>, LedgerError> {
        let result = conn.query_row(
            "SELECT id, kind, state, source, created_at, updated_at, error \
             FROM jobs WHERE id = ?",
            params![id],
            Self::row_to_job,
        );

        match result {
            Ok(mut job) => {
                job.manifest = Self::load_manifest(conn, id)?;
                Ok(Some(job))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LedgerError::Database(e.to_string())),
        }
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

impl JobLedger for SqliteLedger {
    fn create(&self, request: CreateJobRequest) -> Result<Job, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let state = JobState::Pending;

        let insert = conn.execute(
            "INSERT INTO jobs (id, kind, state, source, idempotency_key, created_at, updated_at, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL)",
            params![
                id,
                request.kind.as_str(),
                state.as_str(),
                request.source,
                request.idempotency_key,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        );

        if let Err(e) = insert {
            if Self::is_unique_violation(&e) {
                return Err(LedgerError::DuplicateJob(
                    request.idempotency_key.unwrap_or_default(),
                ));
            }
            return Err(LedgerError::Database(e.to_string()));
        }

        Ok(Job {
            id,
            kind: request.kind,
            state,
            source: request.source,
            created_at: now,
            updated_at: now,
            error: None,
            manifest: Vec::new(),
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, LedgerError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_job(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, kind, state, source, created_at, updated_at, error \
             FROM jobs {} ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row_result in rows {
            let mut job = row_result.map_err(|e| LedgerError::Database(e.to_string()))?;
            job.manifest = Self::load_manifest(&conn, &job.id)?;
            jobs.push(job);
        }

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, LedgerError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| LedgerError::Database(e.to_string()))
    }

    fn transition(
        &self,
        id: &str,
        from: JobState,
        to: JobState,
        detail: Option<&str>,
    ) -> Result<Job, LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let actual_str: String = match tx.query_row(
            "SELECT state FROM jobs WHERE id = ?",
            params![id],
            |row| row.get(0),
        ) {
            Ok(s) => s,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(LedgerError::NotFound(id.to_string()));
            }
            Err(e) => return Err(LedgerError::Database(e.to_string())),
        };

        let actual = JobState::parse(&actual_str)
            .ok_or_else(|| LedgerError::Database(format!("unknown job state: {actual_str}")))?;

        if actual != from {
            return Err(LedgerError::StaleState {
                job_id: id.to_string(),
                expected: from,
                actual,
            });
        }

        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                job_id: id.to_string(),
                from,
                to,
            });
        }

        let now = Utc::now();
        let error_detail = match to {
            JobState::Failed | JobState::Cancelled => detail,
            _ => None,
        };

        // The WHERE clause repeats the state check so the swap stays atomic
        // even if the connection ever stops being exclusively locked.
        let updated = tx
            .execute(
                "UPDATE jobs SET state = ?, error = ?, updated_at = ? WHERE id = ? AND state = ?",
                params![to.as_str(), error_detail, now.to_rfc3339(), id, from.as_str()],
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(LedgerError::StaleState {
                job_id: id.to_string(),
                expected: from,
                actual,
            });
        }

        let job = Self::fetch_job(&tx, id)?.ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        tx.commit()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(job)
    }

    fn append_segment(&self, id: &str, descriptor: &SegmentDescriptor) -> Result<(), LedgerError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let exists: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        if exists == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }

        let max_seq: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) FROM segments WHERE job_id = ?",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let expected = (max_seq + 1) as u32;
        if descriptor.seq != expected {
            return Err(LedgerError::SequenceGap {
                job_id: id.to_string(),
                expected,
                got: descriptor.seq,
            });
        }

        tx.execute(
            "INSERT INTO segments (job_id, seq, path, duration_secs, size_bytes, checksum) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                id,
                descriptor.seq,
                descriptor.path.to_string_lossy().to_string(),
                descriptor.duration_secs,
                descriptor.size_bytes,
                descriptor.checksum,
            ],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        tx.execute(
            "UPDATE jobs SET updated_at = ? WHERE id = ?",
            params![Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| LedgerError::Database(e.to_string()))
    }
}
