//! Error types for the papers2zotero command line tool.

use std::path::PathBuf;

use papers2zotero::error::MigrateError;
use thiserror::Error;

/// Error type alias used throughout the command line tool.
pub type Result<T> = core::result::Result<T, CliError>;

/// Errors that end a command line run.
#[derive(Error, Debug)]
pub enum CliError {
  /// Loading, extraction, upload or checkpoint failure from the library.
  #[error(transparent)]
  Migrate(#[from] MigrateError),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// The confirmation prompt could not be shown or answered.
  #[error(transparent)]
  Dialog(#[from] dialoguer::Error),

  /// The Papers2 folder holds no database.
  #[error("No Papers2 database found at {}", .0.display())]
  MissingLibrary(PathBuf),

  /// A command line option had a value that could not be used.
  #[error("Invalid value for --{option}: {message}")]
  InvalidOption {
    /// Long name of the option
    option:  &'static str,
    /// What was wrong with it
    message: String,
  },
}
