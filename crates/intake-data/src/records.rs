//! File metadata records and the stores that persist them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DataError, Result};

const INSERT_FILE: &str = r"
    INSERT INTO intake.files (id, file_path, file_name, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
";

const SELECT_FILE_BY_NAME: &str = r"
    SELECT id, file_path, file_name, status, created_at, updated_at
    FROM intake.files
    WHERE file_name = $1
    ORDER BY created_at DESC
    LIMIT 1
";

/// Processing status stored alongside each ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Freshly ingested.
    New,
    /// Marked unusable by a downstream consumer.
    Invalid,
}

impl FileStatus {
    /// Label used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = DataError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "NEW" => Ok(Self::New),
            "INVALID" => Ok(Self::Invalid),
            other => Err(DataError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Metadata about one file that landed in a target directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Absolute path of the file after the move.
    pub file_path: String,
    /// Final path component of `file_path`.
    pub file_name: String,
    /// Processing status.
    pub status: FileStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last changed.
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Build a fresh `New` record for a file now living at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not valid UTF-8 or has no file name.
    pub fn new_for_path(path: &Path) -> Result<Self> {
        let file_path = path.to_str().ok_or_else(|| DataError::PathNotUtf8 {
            field: "file_path",
            path: path.to_path_buf(),
        })?;
        let file_name = path
            .file_name()
            .ok_or_else(|| DataError::MissingFileName {
                path: path.to_path_buf(),
            })?
            .to_str()
            .ok_or_else(|| DataError::PathNotUtf8 {
                field: "file_name",
                path: path.to_path_buf(),
            })?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            file_path: file_path.to_string(),
            file_name: file_name.to_string(),
            status: FileStatus::New,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Durable store for ingested file metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist a new `New` record for the file at `path` and return it.
    async fn create_record(&self, path: &Path) -> Result<FileRecord>;

    /// Most recently created record whose file name equals `name`.
    async fn find_by_name(&self, name: &str) -> Result<Option<FileRecord>>;
}

/// Postgres-backed [`MetadataStore`].
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl fmt::Debug for PgMetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgMetadataStore").finish_non_exhaustive()
    }
}

impl PgMetadataStore {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create_record(&self, path: &Path) -> Result<FileRecord> {
        let record = FileRecord::new_for_path(path)?;
        sqlx::query(INSERT_FILE)
            .bind(record.id)
            .bind(&record.file_path)
            .bind(&record.file_name)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "files.insert",
                source,
            })?;
        debug!(record_id = %record.id, path = %record.file_path, "file record created");
        Ok(record)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(SELECT_FILE_BY_NAME)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "files.find_by_name",
                source,
            })?;
        row.map(FileRecord::try_from).transpose()
    }
}

#[derive(Debug, Clone, FromRow)]
struct FileRow {
    id: Uuid,
    file_path: String,
    file_name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = DataError;

    fn try_from(row: FileRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            file_path: row.file_path,
            file_name: row.file_name,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
