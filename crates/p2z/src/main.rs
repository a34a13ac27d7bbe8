//! Command line tool moving a Papers2 library into Zotero.
//!
//! Settings come from an optional TOML file (`--config`), then from the command line, which
//! overrides the file. Progress is tracked in a checkpoint file, so an interrupted import can be
//! run again and only uploads what is missing.
//!
//! # Usage
//!
//! ```bash
//! # See what would be uploaded, without touching Zotero
//! papers2zotero --dry-run --output items.json
//!
//! # Import into a personal library
//! papers2zotero --library-id 12345 --api-key <key>
//!
//! # Only journal articles, only the "Thesis" collection, more logging
//! papers2zotero -vv --config papers2zotero.toml --types "Journal Article" --collections Thesis
//! ```
//!
//! Status messages and logs go to stderr, so a dry run can write its JSON to stdout.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use clap::{builder::ArgAction, Parser};
use console::style;
use papers2zotero::{
  checkpoint::Checkpoint,
  config::{CollectionSelection, DryRunTarget, ImportConfig, KeywordSource},
  importer::{ImportStats, Importer},
  papers2::{Papers2, PubType, PublicationFilter},
  prelude::*,
  zotero::{OfflineClient, ZoteroClient},
};
use tracing::{debug, trace};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod error;

use crate::error::*;

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "⚠️ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";

/// Command line options. Every import setting overrides the configuration file.
#[derive(Parser)]
#[command(author, version, about = "Migrate a Papers2 library into a Zotero library")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(short, long, action = ArgAction::Count, help = "Increase logging verbosity")]
  verbose: u8,

  /// Also write the log to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// TOML configuration file
  #[arg(long, short)]
  config: Option<PathBuf>,

  /// Papers2 library folder (defaults to ~/Documents/Papers2)
  #[arg(long, short = 'f')]
  papers2_folder: Option<PathBuf>,

  /// Zotero library id
  #[arg(long, short = 'i')]
  library_id: Option<String>,

  /// Zotero library type: user or group
  #[arg(long, short = 't')]
  library_type: Option<String>,

  /// Zotero API key with write access
  #[arg(long, short = 'k')]
  api_key: Option<String>,

  /// Keyword types converted to tags: user, auto, label
  #[arg(long, value_delimiter = ',')]
  keyword_types: Option<Vec<String>>,

  /// Label tag overrides as Name=tag, e.g. Red=urgent
  #[arg(long, value_delimiter = ',')]
  label_map: Option<Vec<String>>,

  /// Prefix of label tags without an override
  #[arg(long)]
  label_prefix: Option<String>,

  /// Collections to recreate: all, none or a comma separated list of names
  #[arg(long)]
  collections: Option<String>,

  /// Items per upload request (1 to 50)
  #[arg(long, short)]
  batch_size: Option<usize>,

  /// File recording the publications already imported
  #[arg(long)]
  checkpoint_file: Option<PathBuf>,

  /// Attachments to upload: all, unread or none
  #[arg(long, short)]
  attachments: Option<String>,

  /// Only import these publication types, e.g. "Journal Article"
  #[arg(long, value_delimiter = ',')]
  types: Option<Vec<String>>,

  /// Only import these publication ids
  #[arg(long, value_delimiter = ',')]
  ids: Option<Vec<i64>>,

  /// Write items as JSON instead of uploading them
  #[arg(long, short = 'n')]
  dry_run: bool,

  /// Dry run output: stdout or a file path
  #[arg(long, short)]
  output: Option<String>,

  /// Skip the confirmation prompt
  #[arg(long, short = 'y', alias = "accept-defaults")]
  yes: bool,
}

impl Cli {
  /// Settings of this run: defaults, then the configuration file, then the options.
  fn import_config(&self) -> Result<ImportConfig> {
    let mut config = match &self.config {
      Some(path) => ImportConfig::from_file(path)?,
      None => ImportConfig::default(),
    };

    if let Some(folder) = &self.papers2_folder {
      config.papers2_folder = folder.clone();
    }
    if let Some(library_id) = &self.library_id {
      config.library_id = Some(library_id.clone());
    }
    if let Some(library_type) = &self.library_type {
      config.library_type = library_type.parse()?;
    }
    if let Some(api_key) = &self.api_key {
      config.api_key = Some(api_key.clone());
    }
    if let Some(keyword_types) = &self.keyword_types {
      config.keyword_sources = keyword_types
        .iter()
        .map(|kind| kind.parse::<KeywordSource>())
        .collect::<core::result::Result<Vec<_>, _>>()?;
    }
    if let Some(pairs) = &self.label_map {
      for pair in pairs {
        let (name, tag) = pair.split_once('=').ok_or_else(|| CliError::InvalidOption {
          option:  "label-map",
          message: format!("expected Name=tag, got \"{pair}\""),
        })?;
        config.label_overrides.insert(name.trim().to_string(), tag.trim().to_string());
      }
    }
    if let Some(prefix) = &self.label_prefix {
      config.label_prefix = prefix.clone();
    }
    if let Some(collections) = &self.collections {
      config.collections = collections.parse()?;
    }
    if let Some(batch_size) = self.batch_size {
      config.batch_size = batch_size;
    }
    if let Some(checkpoint_file) = &self.checkpoint_file {
      config.checkpoint_file = checkpoint_file.clone();
    }
    if let Some(attachments) = &self.attachments {
      config.attachments = attachments.parse()?;
    }
    if let Some(types) = &self.types {
      config.pub_types = Some(
        types
          .iter()
          .map(|kind| kind.parse::<PubType>())
          .collect::<core::result::Result<Vec<_>, _>>()?,
      );
    }
    if let Some(ids) = &self.ids {
      config.ids = Some(ids.clone());
    }
    if self.dry_run {
      config.dry_run = true;
    }
    if let Some(output) = &self.output {
      config.dry_run_output = output.parse()?;
    }

    trace!(?config, "Resolved import settings");
    Ok(config)
  }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// `RUST_LOG` takes precedence when set. With a log file, the returned guard must be kept alive
/// until the run ends so buffered lines are written out.
fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let level = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let name = path.file_name().ok_or_else(|| CliError::InvalidOption {
        option:  "log-file",
        message: format!("{} is not a file path", path.display()),
      })?;
      let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
      };
      std::fs::create_dir_all(&dir)?;
      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    },
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_line_number(true))
    .with(file_layer)
    .init();
  Ok(guard)
}

/// Entry point for the papers2zotero command line tool
///
/// # Errors
///
/// Returns [`CliError`] when the settings are invalid, the Papers2 library can't be read, or a
/// batch upload or checkpoint write fails. Individual publications that can't be converted or
/// that Zotero rejects are reported but don't fail the run.
fn main() -> Result<()> {
  let cli = Cli::parse();
  let _guard = setup_logging(cli.verbose, cli.log_file.as_deref())?;

  let result = cli.import_config().and_then(|config| {
    config.validate()?;
    run(&cli, &config)
  });
  if let Err(e) = &result {
    eprintln!("{} {}", style(ERROR_PREFIX).red(), style(e).red());
  }
  result
}

/// Runs one import with resolved settings.
fn run(cli: &Cli, config: &ImportConfig) -> Result<()> {
  let database = Papers2::database_path(&config.papers2_folder);
  if !database.exists() {
    return Err(CliError::MissingLibrary(database));
  }
  debug!(database = %database.display(), "Found Papers2 database");

  let papers2 = Papers2::new(&config.papers2_folder);
  let filter = config.publication_filter();
  let checkpoint = Checkpoint::open(&config.checkpoint_file)?;
  eprintln!(
    "{} Reading {} ({} already imported)",
    style(INFO_PREFIX).cyan(),
    style(config.papers2_folder.display()).yellow(),
    style(checkpoint.committed().len()).yellow()
  );

  let stats = if config.dry_run {
    let target = match &config.dry_run_output {
      DryRunTarget::Stdout => "stdout".to_string(),
      DryRunTarget::File(path) => path.display().to_string(),
    };
    eprintln!("{} Dry run, writing items to {}", style(INFO_PREFIX).cyan(), style(target).yellow());
    Importer::new(&papers2, OfflineClient, checkpoint, config)?.run(&filter)?
  } else {
    let library_id = config.library_id.as_deref().unwrap_or_default();
    let api_key = config.api_key.as_deref().unwrap_or_default();
    let client = ZoteroClient::new(library_id, config.library_type, api_key)?;

    if !cli.yes && !confirm(&papers2, &filter, config, library_id)? {
      eprintln!("{} Import cancelled", style(WARNING_PREFIX).yellow());
      return Ok(());
    }
    Importer::new(&papers2, client, checkpoint, config)?.run(&filter)?
  };
  papers2.close()?;

  print_summary(&stats, config.dry_run);
  Ok(())
}

/// Asks before uploading anything.
fn confirm(
  papers2: &Papers2,
  filter: &PublicationFilter,
  config: &ImportConfig,
  library_id: &str,
) -> Result<bool> {
  let count = papers2.publications(filter)?.count();
  let collections = match &config.collections {
    CollectionSelection::All => "all collections".to_string(),
    CollectionSelection::Named(names) => names.join(", "),
    CollectionSelection::None => "no collections".to_string(),
  };
  Ok(
    dialoguer::Confirm::new()
      .with_prompt(format!(
        "Import up to {count} publications ({collections}) into Zotero library {library_id}?"
      ))
      .default(false)
      .wait_for_newline(true)
      .interact()?,
  )
}

/// Prints the run counters.
fn print_summary(stats: &ImportStats, dry_run: bool) {
  let verb = if dry_run { "Wrote" } else { "Imported" };
  eprintln!(
    "{} {verb} {} items in {} batches",
    style(SUCCESS_PREFIX).green(),
    style(stats.uploaded).green(),
    stats.batches
  );
  if stats.skipped > 0 {
    eprintln!(
      "{} Skipped {} publications imported by an earlier run",
      style(INFO_PREFIX).cyan(),
      stats.skipped
    );
  }
  if stats.failed > 0 {
    eprintln!(
      "{} {} publications could not be converted, see the log for details",
      style(WARNING_PREFIX).yellow(),
      style(stats.failed).yellow()
    );
  }
  if stats.rejected > 0 {
    eprintln!(
      "{} {} items were rejected by Zotero and will be retried on the next run",
      style(WARNING_PREFIX).yellow(),
      style(stats.rejected).yellow()
    );
  }
}
