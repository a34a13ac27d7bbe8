//! Migration of a Papers2 library into a Zotero library.
//!
//! `papers2zotero` reads publications out of a local Papers2 database and
//! uploads them to Zotero through the Zotero Web API, providing:
//!
//! - A read-only view over the Papers2 SQLite database
//! - A declarative table of field extraction rules mapping Papers2 columns onto Zotero item fields
//! - Batched uploads with per-item failure reconciliation
//! - A durable checkpoint so an interrupted import resumes without duplicating items
//! - A dry-run mode that writes the would-be items as JSON instead of uploading
//!
//! # Getting Started
//!
//! ```no_run
//! use papers2zotero::{
//!   checkpoint::Checkpoint,
//!   config::ImportConfig,
//!   importer::Importer,
//!   papers2::{Library, Papers2, PublicationFilter},
//!   zotero::{LibraryType, ZoteroClient},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = ImportConfig::from_file("papers2zotero.toml")?;
//!   let papers2 = Papers2::new(&config.papers2_folder);
//!   let client = ZoteroClient::new("12345", LibraryType::User, "api-key")?;
//!   let checkpoint = Checkpoint::open(&config.checkpoint_file)?;
//!
//!   let mut importer = Importer::new(&papers2, client, checkpoint, &config)?;
//!   for publication in papers2.publications(&PublicationFilter::default())? {
//!     importer.add_publication(&publication?)?;
//!   }
//!   let stats = importer.close()?;
//!   println!("uploaded {} items", stats.uploaded);
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`papers2`]: Read-only access to the source database and its vocabulary
//! - [`zotero`]: Destination API trait, HTTP and offline clients, item types
//! - [`extract`]: Field extraction rules and the context they run in
//! - [`checkpoint`]: Staged/committed set of already imported publication ids
//! - [`batch`]: Accumulator of items awaiting upload
//! - [`importer`]: The orchestrator tying everything together
//! - [`config`]: Import settings and configuration file loading
//! - [`writer`]: Dry-run JSON output

#![warn(missing_docs)]

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod importer;
pub mod papers2;
pub mod writer;
pub mod zotero;

#[cfg(test)] mod testing;

use crate::{
  batch::*, checkpoint::*, config::*, error::*, extract::*, papers2::*, writer::*, zotero::*,
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use papers2zotero::prelude::*;
///
/// fn count(library: &dyn Library) -> Result<usize, MigrateError> {
///   Ok(library.publications(&Default::default())?.count())
/// }
/// ```
pub mod prelude {
  pub use crate::{error::MigrateError, papers2::Library, zotero::ZoteroApi};
}
