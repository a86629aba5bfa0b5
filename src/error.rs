use serde::Serialize;
use sqlx::error::ErrorKind;
use thiserror::Error;

use crate::database_ops::model::Dimension;

/// Failure taxonomy for the loader.
///
/// Row-level variants (constraint, missing reference, invalid source row) are
/// recorded against the row and the pass moves on. `Transient` is retried and
/// aborts the run once retries are exhausted; `Storage` aborts immediately.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("missing {dimension} reference for natural key {natural_key}")]
    MissingReference {
        dimension: Dimension,
        natural_key: i64,
    },

    #[error("no adaptation fact for book_id {book_id}, movie_id {movie_id}")]
    MissingAdaptation { book_id: i64, movie_id: i64 },

    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("invalid source row: {0}")]
    InvalidSource(String),

    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ConstraintViolation,
    MissingReference,
    InvalidSource,
}

impl LoadError {
    pub fn missing(dimension: Dimension, natural_key: i64) -> Self {
        Self::MissingReference {
            dimension,
            natural_key,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Kind of per-row issue, or None when the error must abort the run.
    pub fn issue_kind(&self) -> Option<IssueKind> {
        match self {
            Self::ConstraintViolation { .. } => Some(IssueKind::ConstraintViolation),
            Self::MissingReference { .. } | Self::MissingAdaptation { .. } => {
                Some(IssueKind::MissingReference)
            }
            Self::InvalidSource(_) => Some(IssueKind::InvalidSource),
            Self::Transient(_) | Self::Storage(_) => None,
        }
    }
}

/// SQLSTATEs worth retrying: serialization failure, deadlock, admin shutdown,
/// too many connections and the whole connection-exception class.
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03" | "53300")
        || code.starts_with("08")
}

impl From<sqlx::Error> for LoadError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                let table = db_err.table().unwrap_or("unknown").to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => Self::ConstraintViolation {
                        table,
                        message: db_err.message().to_string(),
                    },
                    _ if is_transient_sqlstate(&code) => {
                        Self::Transient(format!("{code}: {}", db_err.message()))
                    }
                    // data_exception: overflow, bad date, invalid text representation
                    _ if code.starts_with("22") => {
                        Self::InvalidSource(format!("{code}: {}", db_err.message()))
                    }
                    _ => Self::Storage(format!("{code}: {}", db_err.message())),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => Self::Transient(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::InvalidSource(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}
