//! Error types for `splitkit-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A required field is missing or a value fails validation.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// A uniqueness invariant (name, key, ...) would be violated.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// Stored configuration cannot be acted on, e.g. every variant weight is
  /// zero.
  #[error("misconfigured: {0}")]
  Misconfigured(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse classification of a failure, used by outer layers to choose a
/// response without knowing the concrete backend error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  InvalidInput,
  Conflict,
  NotFound,
  Misconfigured,
  /// The durable store could not be reached or failed mid-operation.
  Unavailable,
  Internal,
}

/// Implemented by every error type that can come out of a store.
pub trait ClassifyError {
  fn kind(&self) -> ErrorKind;
}

impl ClassifyError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::Misconfigured(_) => ErrorKind::Misconfigured,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}

// ─── Validation helpers ──────────────────────────────────────────────────────

/// Trim `value` and check that it is non-empty and at most `max` characters.
pub(crate) fn required_text(
  field: &str,
  value: &str,
  max: usize,
) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::InvalidInput(format!("{field} is required")));
  }
  if trimmed.chars().count() > max {
    return Err(Error::InvalidInput(format!(
      "{field} must be at most {max} characters"
    )));
  }
  Ok(trimmed.to_owned())
}

/// Check an optional free-text field against a length limit.
pub(crate) fn optional_text(
  field: &str,
  value: Option<&str>,
  max: usize,
) -> Result<()> {
  match value {
    Some(v) if v.chars().count() > max => Err(Error::InvalidInput(format!(
      "{field} must be at most {max} characters"
    ))),
    _ => Ok(()),
  }
}
