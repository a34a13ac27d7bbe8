//! Error types for the papers2zotero library.
//!
//! Errors fall into four groups that the [`importer`](crate::importer) treats differently:
//! - Per-record mapping errors (unmapped publication type, unsupported author kind), which drop a
//!   single publication and let the run continue
//! - Per-item upload failures, which are not errors at all but entries in the
//!   [`CreateResponse`](crate::zotero::CreateResponse) of a batch
//! - Batch-level failures (network, validation, API status), which abort the run
//! - Checkpoint persistence failures, which abort the run with nothing assumed saved
//!
//! # Examples
//!
//! ```
//! use papers2zotero::error::MigrateError;
//!
//! let err = MigrateError::UnmappedPublicationType(999);
//! assert!(err.is_record_error());
//! ```

use thiserror::Error;

/// Error type alias used for the [`papers2zotero`](crate) crate.
pub type Result<T> = core::result::Result<T, MigrateError>;

/// Errors that can occur while migrating a Papers2 library into Zotero.
#[derive(Error, Debug)]
pub enum MigrateError {
  /// A SQLite operation against the Papers2 database failed.
  ///
  /// This covers opening the database file, preparing statements against tables
  /// that don't exist in the expected shape, and column type conversions.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// A network request to the Zotero API failed before a response was received.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The Zotero API answered with a non-success status code.
  #[error("Zotero API returned {status}: {message}")]
  Api {
    /// HTTP status code of the response
    status:  u16,
    /// Body of the response, usually a plain-text explanation
    message: String,
  },

  /// The Zotero API answered with a body we could not interpret.
  #[error("Unexpected response from Zotero: {0}")]
  UnexpectedResponse(String),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// JSON encoding or decoding failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// A configuration file could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// The Zotero base URL could not be parsed or joined.
  #[error(transparent)]
  Url(#[from] url::ParseError),

  /// Writing the checkpoint through its temporary file failed.
  ///
  /// The previous checkpoint file is left untouched when this happens.
  #[error("Failed to persist checkpoint: {0}")]
  CheckpointPersist(#[from] tempfile::PersistError),

  /// The publication's subtype has no corresponding Zotero item type.
  #[error("Publication subtype {0} has no Zotero item type")]
  UnmappedPublicationType(i64),

  /// An ordered author carried a role other than author (0) or editor (1).
  #[error("Unsupported author type {0}")]
  UnsupportedAuthorType(i64),

  /// The publication carried a label code outside the known color labels.
  #[error("Unknown label code {0}")]
  UnknownLabel(i64),

  /// A batch failed client-side validation before being sent.
  #[error("Invalid batch: {0}")]
  InvalidBatch(String),

  /// Invalid or incomplete configuration.
  #[error("{0}")]
  Config(String),
}

impl MigrateError {
  /// Returns true if this error concerns a single publication only.
  ///
  /// Record errors are logged and the publication is dropped; every other error
  /// is fatal for the run.
  pub fn is_record_error(&self) -> bool {
    matches!(
      self,
      MigrateError::UnmappedPublicationType(_)
        | MigrateError::UnsupportedAuthorType(_)
        | MigrateError::UnknownLabel(_)
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_record_errors() {
    assert!(MigrateError::UnmappedPublicationType(1).is_record_error());
    assert!(MigrateError::UnsupportedAuthorType(2).is_record_error());
    assert!(MigrateError::UnknownLabel(9).is_record_error());
    assert!(!MigrateError::InvalidBatch("too large".into()).is_record_error());
    assert!(!MigrateError::Api { status: 500, message: "oops".into() }.is_record_error());
  }

  #[test]
  fn test_error_display() {
    let err = MigrateError::Api { status: 403, message: "Forbidden".into() };
    assert_eq!(err.to_string(), "Zotero API returned 403: Forbidden");
    assert_eq!(
      MigrateError::UnmappedPublicationType(999).to_string(),
      "Publication subtype 999 has no Zotero item type"
    );
  }
}
