//! Items waiting to be uploaded together.

use super::*;

/// One publication ready for upload, with everything that is uploaded after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
  /// Papers2 id, tracked by the checkpoint
  #[serde(skip)]
  pub publication_id: i64,
  /// The item itself, seeded from its type's template
  pub item:           Item,
  /// Child notes, created once the item has a key
  pub notes:          Vec<Item>,
  /// Files uploaded as child attachments
  pub attachments:    Vec<Attachment>,
  /// Keys of the collections the item is added to
  #[serde(skip)]
  pub collections:    Vec<String>,
}

/// An ordered batch of entries with a flush threshold.
///
/// The capacity is not a hard limit: [`Batch::add`] always succeeds and the owner flushes once
/// [`Batch::is_full`] reports true.
#[derive(Debug)]
pub struct Batch {
  capacity: usize,
  entries:  Vec<BatchEntry>,
}

impl Batch {
  /// An empty batch that is full at `capacity` entries.
  pub fn new(capacity: usize) -> Self {
    Self { capacity: capacity.max(1), entries: Vec::with_capacity(capacity.max(1)) }
  }

  /// Appends an entry, even past capacity.
  pub fn add(&mut self, entry: BatchEntry) { self.entries.push(entry); }

  /// Whether the batch holds at least `capacity` entries.
  pub fn is_full(&self) -> bool { self.entries.len() >= self.capacity }

  /// Whether there is nothing to flush.
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Number of entries.
  pub fn len(&self) -> usize { self.entries.len() }

  /// The flush threshold.
  pub fn capacity(&self) -> usize { self.capacity }

  /// Entries in insertion order. Each call starts from the first entry.
  pub fn iter(&self) -> std::slice::Iter<'_, BatchEntry> { self.entries.iter() }

  /// The entry at `index`, as numbered in upload responses.
  pub fn get(&self, index: usize) -> Option<&BatchEntry> { self.entries.get(index) }

  /// The items of all entries, in order, as sent to the API.
  pub fn items(&self) -> Vec<Item> { self.entries.iter().map(|entry| entry.item.clone()).collect() }

  /// Drops every entry, keeping the capacity.
  pub fn clear(&mut self) { self.entries.clear(); }
}

impl<'a> IntoIterator for &'a Batch {
  type IntoIter = std::slice::Iter<'a, BatchEntry>;
  type Item = &'a BatchEntry;

  fn into_iter(self) -> Self::IntoIter { self.iter() }
}
