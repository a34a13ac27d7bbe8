//! The import loop: publications in, Zotero items out.
//!
//! [`Importer::add_publication`] takes one publication at a time. Publications already in the
//! checkpoint are skipped. The others are extracted into a [`BatchEntry`], their id is staged in
//! the checkpoint, and the entry joins the current [`Batch`]. A full batch is flushed:
//!
//! 1. the items are validated and created in one request
//! 2. ids of items Zotero rejected are removed from the checkpoint staging
//! 3. created and unchanged items get their notes, attachments and collections
//! 4. the checkpoint is committed
//!
//! The batch is cleared after every flush attempt. If any step fails the staged ids are rolled
//! back and the error is returned; batches committed earlier stay committed.
//!
//! [`Importer::close`] flushes whatever is left. In a dry run, entries are written to a
//! [`JsonWriter`] instead and the checkpoint is never committed.

use super::*;

/// Collection key used for every collection during a dry run.
pub const DRY_RUN_COLLECTION_KEY: &str = "<key>";

/// Counters of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
  /// Publications skipped because they were already imported
  pub skipped:  usize,
  /// Publications that could not be converted into an item
  pub failed:   usize,
  /// Items Zotero refused to create
  pub rejected: usize,
  /// Items created or found unchanged (written, in a dry run)
  pub uploaded: usize,
  /// Batches flushed
  pub batches:  usize,
}

/// Drives publications from a [`Library`] into a [`ZoteroApi`].
pub struct Importer<'a, Z: ZoteroApi> {
  library:         &'a dyn Library,
  client:          Z,
  checkpoint:      Checkpoint,
  batch:           Batch,
  keyword_sources: Vec<KeywordSource>,
  label_map:       BTreeMap<Label, String>,
  attachments:     AttachmentPolicy,
  selection:       CollectionSelection,
  /// Collection name to key, resolved before the first publication is extracted
  collections:     Option<BTreeMap<String, String>>,
  writer:          Option<JsonWriter>,
  stats:           ImportStats,
}

impl<'a, Z: ZoteroApi> Importer<'a, Z> {
  /// Creates an importer. When `config.dry_run` is set, the dry run output is opened here.
  pub fn new(
    library: &'a dyn Library,
    client: Z,
    checkpoint: Checkpoint,
    config: &ImportConfig,
  ) -> Result<Self> {
    if !(1..=MAX_BATCH_SIZE).contains(&config.batch_size) {
      return Err(MigrateError::Config(format!(
        "Batch size must be between 1 and {MAX_BATCH_SIZE}, got {}",
        config.batch_size
      )));
    }
    let writer = if config.dry_run { Some(JsonWriter::open(&config.dry_run_output)?) } else { None };

    Ok(Self {
      library,
      client,
      checkpoint,
      batch: Batch::new(config.batch_size),
      keyword_sources: config.keyword_sources.clone(),
      label_map: config.label_map()?,
      attachments: config.attachments,
      selection: config.collections.clone(),
      collections: None,
      writer,
      stats: ImportStats::default(),
    })
  }

  /// Whether entries go to a JSON writer instead of Zotero.
  pub fn is_dry_run(&self) -> bool { self.writer.is_some() }

  /// Counters so far.
  pub fn stats(&self) -> ImportStats { self.stats }

  /// The checkpoint, with anything staged by the pending batch.
  pub fn checkpoint(&self) -> &Checkpoint { &self.checkpoint }

  /// Imports every publication selected by `filter`, then closes the importer.
  pub fn run(mut self, filter: &PublicationFilter) -> Result<ImportStats> {
    let library = self.library;
    for publication in library.publications(filter)? {
      self.add_publication(&publication?)?;
    }
    self.close()
  }

  /// Adds one publication, flushing the batch if it becomes full.
  ///
  /// Returns `false` when the publication was skipped, either because it is already imported or
  /// because it could not be converted. Only errors that affect the whole run are returned.
  pub fn add_publication(&mut self, publication: &Publication) -> Result<bool> {
    if self.checkpoint.contains(publication.id) {
      debug!(publication_id = publication.id, "Skipping already imported publication");
      self.stats.skipped += 1;
      return Ok(false);
    }
    self.provision_collections()?;

    let entry = match self.extract(publication) {
      Ok(entry) => entry,
      Err(e) if e.is_record_error() => {
        error!(
          publication_id = publication.id,
          error = %e,
          "Skipping publication {}",
          publication.describe()
        );
        self.stats.failed += 1;
        return Ok(false);
      },
      Err(e) => return Err(e),
    };
    trace!(publication_id = publication.id, item_type = ?entry.item.get("itemType"), "Extracted item");

    self.checkpoint.add(publication.id);
    self.batch.add(entry);
    if self.batch.is_full() {
      self.flush()?;
    }
    Ok(true)
  }

  /// Flushes the remaining entries and releases the client and dry run output.
  pub fn close(mut self) -> Result<ImportStats> {
    self.flush()?;
    if let Some(writer) = self.writer.as_mut() {
      writer.close()?;
    }
    info!(
      uploaded = self.stats.uploaded,
      skipped = self.stats.skipped,
      failed = self.stats.failed,
      rejected = self.stats.rejected,
      "Import finished"
    );
    Ok(self.stats)
  }

  fn extract(&self, publication: &Publication) -> Result<BatchEntry> {
    let no_collections = BTreeMap::new();
    let ctx = ExtractionContext {
      library:         self.library,
      client:          &self.client,
      keyword_sources: &self.keyword_sources,
      label_map:       &self.label_map,
      collections:     self.collections.as_ref().unwrap_or(&no_collections),
      attachments:     self.attachments,
    };
    extract_entry(publication, &ctx)
  }

  /// Resolves the selected collections to Zotero keys, creating the missing ones. Runs once.
  #[instrument(skip(self))]
  fn provision_collections(&mut self) -> Result<()> {
    if self.collections.is_some() {
      return Ok(());
    }

    let mut names: Vec<String> = match &self.selection {
      CollectionSelection::All =>
        self.library.collections(None)?.into_iter().map(|collection| collection.name).collect(),
      CollectionSelection::Named(names) => names.clone(),
      CollectionSelection::None => Vec::new(),
    };
    names.sort();
    names.dedup();

    let mut keys = BTreeMap::new();
    if names.is_empty() {
      debug!("No collections selected");
    } else if self.is_dry_run() {
      keys = names.into_iter().map(|name| (name, DRY_RUN_COLLECTION_KEY.to_string())).collect();
    } else {
      let existing: BTreeSet<String> =
        self.client.collections()?.into_iter().map(|collection| collection.name).collect();
      let missing: Vec<String> =
        names.iter().filter(|name| !existing.contains(*name)).cloned().collect();
      if !missing.is_empty() {
        info!(count = missing.len(), "Creating collections in Zotero");
        self.client.create_collection(&missing)?;
      }

      for collection in self.client.collections()? {
        if names.contains(&collection.name) {
          keys.entry(collection.name).or_insert(collection.key);
        }
      }
      for name in names.iter().filter(|name| !keys.contains_key(*name)) {
        warn!(collection = %name, "Collection not found in Zotero after creating it");
      }
    }

    debug!(count = keys.len(), "Resolved collections");
    self.collections = Some(keys);
    Ok(())
  }

  /// Flushes the batch if it holds anything. The batch is empty afterwards, whatever happens.
  #[instrument(skip(self), fields(batch_size = self.batch.len()))]
  fn flush(&mut self) -> Result<()> {
    if self.batch.is_empty() {
      return Ok(());
    }

    let result = if self.writer.is_some() { self.write_batch() } else { self.upload_batch() };
    self.batch.clear();

    match result {
      Ok(()) => {
        self.stats.batches += 1;
        Ok(())
      },
      Err(e) => {
        error!(error = %e, "Failed to import batch");
        self.checkpoint.rollback();
        Err(e)
      },
    }
  }

  fn write_batch(&mut self) -> Result<()> {
    if let Some(writer) = self.writer.as_mut() {
      for entry in &self.batch {
        writer.write_entry(entry)?;
      }
    }
    self.stats.uploaded += self.batch.len();
    self.checkpoint.rollback();
    Ok(())
  }

  fn upload_batch(&mut self) -> Result<()> {
    let items = self.batch.items();
    self.client.check_items(&items)?;
    let response = self.client.create_items(&items)?;

    let mut reported = BTreeSet::new();
    for (idx, failure) in response.failures()? {
      reported.insert(idx);
      let Some(entry) = self.batch.get(idx) else {
        warn!(index = idx, "Zotero reported a failure for an item that was not sent");
        continue;
      };
      self.checkpoint.remove(entry.publication_id);
      self.stats.rejected += 1;
      let title = entry.item.get("title").and_then(Value::as_str).unwrap_or_default();
      warn!(
        publication_id = entry.publication_id,
        code = failure.code,
        message = %failure.message,
        title,
        "Zotero rejected item"
      );
    }

    for (idx, key) in response.written()? {
      reported.insert(idx);
      let Some(entry) = self.batch.get(idx) else {
        warn!(index = idx, key = %key, "Zotero reported an item that was not sent");
        continue;
      };
      upload_children(&self.client, entry, &key)?;
      self.stats.uploaded += 1;
    }

    for (idx, entry) in self.batch.iter().enumerate().filter(|(idx, _)| !reported.contains(idx)) {
      warn!(index = idx, publication_id = entry.publication_id, "Zotero did not report item");
      self.checkpoint.remove(entry.publication_id);
    }

    self.checkpoint.commit()?;
    info!(
      uploaded = response.success.len() + response.unchanged.len(),
      rejected = response.failed.len(),
      "Committed batch"
    );
    Ok(())
  }
}

impl<Z: ZoteroApi> Drop for Importer<'_, Z> {
  fn drop(&mut self) {
    if !self.batch.is_empty() {
      warn!(count = self.batch.len(), "Importer dropped before close, pending items discarded");
    }
  }
}

/// Creates the notes of an uploaded item, then attaches its files and adds it to collections.
fn upload_children(client: &impl ZoteroApi, entry: &BatchEntry, key: &str) -> Result<()> {
  if !entry.notes.is_empty() {
    let notes: Vec<Item> = entry
      .notes
      .iter()
      .cloned()
      .map(|mut note| {
        note.insert("parentItem".into(), Value::String(key.to_string()));
        note
      })
      .collect();
    for chunk in notes.chunks(MAX_WRITE_ITEMS) {
      for (idx, failure) in client.create_items(chunk)?.failures()? {
        warn!(parent = key, index = idx, code = failure.code, message = %failure.message, "Note rejected");
      }
    }
  }

  if !entry.attachments.is_empty() {
    client.attachment_simple(&entry.attachments, key)?;
  }

  for collection in &entry.collections {
    client.addto_collection(collection, key)?;
  }
  Ok(())
}
