//! Error type for `splitkit-store-sqlite`.

use splitkit_core::{ClassifyError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Validation failures and constraint violations translated into the
  /// domain taxonomy.
  #[error(transparent)]
  Core(#[from] splitkit_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl ClassifyError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Database(e) if unreachable_store(e) => ErrorKind::Unavailable,
      Error::Database(_)
      | Error::Json(_)
      | Error::Uuid(_)
      | Error::DateParse(_) => ErrorKind::Internal,
    }
  }
}

/// Failures of the connection or the file underneath it, as opposed to
/// problems with a particular statement or row.
fn unreachable_store(err: &tokio_rusqlite::Error) -> bool {
  use rusqlite::ErrorCode;

  match err {
    tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => true,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _)) => matches!(
      f.code,
      ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::CannotOpen
        | ErrorCode::SystemIoFailure
        | ErrorCode::DiskFull
        | ErrorCode::OutOfMemory
        | ErrorCode::ReadOnly
        | ErrorCode::PermissionDenied
        | ErrorCode::DatabaseCorrupt
        | ErrorCode::NotADatabase
    ),
    _ => false,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
