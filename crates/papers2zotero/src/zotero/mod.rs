//! The Zotero side of the migration.
//!
//! [`ZoteroApi`] is the seam between the importer and the Zotero Web API. Two implementations
//! are provided:
//!
//! - [`ZoteroClient`]: talks to `api.zotero.org` (or a compatible server) over HTTP
//! - [`OfflineClient`]: serves item templates locally and refuses every write, used for dry runs
//!
//! Items travel as JSON objects ([`Item`]) seeded from a per-type template, which is how the
//! Zotero API itself describes them.

use super::*;

mod client;
mod item_type;

pub use self::{client::*, item_type::*};

/// A Zotero item as a JSON object of field name to value.
pub type Item = Map<String, Value>;

/// The most items the Zotero API accepts in one write request.
pub const MAX_WRITE_ITEMS: usize = 50;

/// Kind of library an API key gives access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
  /// A personal library, addressed as `/users/<id>`
  #[default]
  User,
  /// A group library, addressed as `/groups/<id>`
  Group,
}

impl LibraryType {
  /// The URL path segment for this library type.
  pub fn path_segment(self) -> &'static str {
    match self {
      LibraryType::User => "users",
      LibraryType::Group => "groups",
    }
  }
}

impl FromStr for LibraryType {
  type Err = MigrateError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "user" => Ok(LibraryType::User),
      "group" => Ok(LibraryType::Group),
      other => Err(MigrateError::Config(format!(
        "Unknown library type \"{other}\", expected \"user\" or \"group\""
      ))),
    }
  }
}

/// An item the Zotero API refused to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
  /// HTTP style status code, e.g. 400 or 413
  pub code:    i64,
  /// Reason given by the server
  pub message: String,
}

/// Outcome of a multi-item write, keyed by the index of each item in the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
  /// Items written, index to item key
  #[serde(default)]
  pub success:   BTreeMap<String, String>,
  /// Items that already existed unchanged, index to item key
  #[serde(default)]
  pub unchanged: BTreeMap<String, String>,
  /// Items that were not written, index to reason
  #[serde(default)]
  pub failed:    BTreeMap<String, FailedItem>,
}

impl CreateResponse {
  /// Successful and unchanged items as `(index, key)` pairs, in index order.
  pub fn written(&self) -> Result<Vec<(usize, String)>> {
    let mut written = self
      .success
      .iter()
      .chain(self.unchanged.iter())
      .map(|(idx, key)| Ok((parse_index(idx)?, key.clone())))
      .collect::<Result<Vec<_>>>()?;
    written.sort_by_key(|(idx, _)| *idx);
    Ok(written)
  }

  /// Failed items as `(index, failure)` pairs, in index order.
  pub fn failures(&self) -> Result<Vec<(usize, &FailedItem)>> {
    let mut failures = self
      .failed
      .iter()
      .map(|(idx, failure)| Ok((parse_index(idx)?, failure)))
      .collect::<Result<Vec<_>>>()?;
    failures.sort_by_key(|(idx, _)| *idx);
    Ok(failures)
  }
}

fn parse_index(idx: &str) -> Result<usize> {
  idx
    .parse()
    .map_err(|_| MigrateError::UnexpectedResponse(format!("non-numeric item index \"{idx}\"")))
}

/// A collection that exists in the Zotero library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCollection {
  /// Zotero collection key
  pub key:  String,
  /// Display name
  pub name: String,
}

/// Operations the importer needs from a Zotero library.
pub trait ZoteroApi {
  /// An empty item of `item_type`, with every field it accepts.
  fn item_template(&self, item_type: ItemType) -> Result<Item>;

  /// Validates a batch client-side before it is sent.
  fn check_items(&self, items: &[Item]) -> Result<()>;

  /// Writes a batch of items, reporting the fate of each one.
  fn create_items(&self, items: &[Item]) -> Result<CreateResponse>;

  /// Attaches files to an existing item.
  fn attachment_simple(&self, attachments: &[Attachment], parent_key: &str) -> Result<()>;

  /// Every collection in the library.
  fn collections(&self) -> Result<Vec<RemoteCollection>>;

  /// Creates top-level collections with the given names.
  fn create_collection(&self, names: &[String]) -> Result<()>;

  /// Adds an existing item to an existing collection.
  fn addto_collection(&self, collection_key: &str, item_key: &str) -> Result<()>;
}

/// Keys the API accepts on any item besides those of its template.
const EXTRA_ITEM_KEYS: [&str; 3] = ["key", "version", "parentItem"];

/// Checks a batch against the templates of its item types.
///
/// A batch is rejected when it exceeds [`MAX_WRITE_ITEMS`], when an item has no valid `itemType`,
/// or when an item carries a field its template doesn't know.
pub fn validate_items(
  items: &[Item],
  template: impl Fn(ItemType) -> Result<Item>,
) -> Result<()> {
  if items.len() > MAX_WRITE_ITEMS {
    return Err(MigrateError::InvalidBatch(format!(
      "{} items exceeds the limit of {MAX_WRITE_ITEMS} per request",
      items.len()
    )));
  }

  let mut templates: HashMap<ItemType, Item> = HashMap::new();
  for (idx, item) in items.iter().enumerate() {
    let item_type = item
      .get("itemType")
      .and_then(Value::as_str)
      .ok_or_else(|| MigrateError::InvalidBatch(format!("item {idx} has no itemType")))?
      .parse::<ItemType>()?;

    if !templates.contains_key(&item_type) {
      templates.insert(item_type, template(item_type)?);
    }
    let known = &templates[&item_type];

    if let Some(field) =
      item.keys().find(|k| !known.contains_key(*k) && !EXTRA_ITEM_KEYS.contains(&k.as_str()))
    {
      return Err(MigrateError::InvalidBatch(format!(
        "item {idx} has field \"{field}\" which is not valid for {item_type}"
      )));
    }
  }
  Ok(())
}

/// A [`ZoteroApi`] that never touches the network.
///
/// Templates come from [`ItemType::local_template`]; every write fails. Used for dry runs, where
/// the importer writes items to a [`JsonWriter`] instead of uploading them.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClient;

impl OfflineClient {
  fn refuse(operation: &str) -> MigrateError {
    MigrateError::Config(format!("{operation} is not available without a Zotero connection"))
  }
}

impl ZoteroApi for OfflineClient {
  fn item_template(&self, item_type: ItemType) -> Result<Item> { Ok(item_type.local_template()) }

  fn check_items(&self, items: &[Item]) -> Result<()> {
    validate_items(items, |item_type| self.item_template(item_type))
  }

  fn create_items(&self, _items: &[Item]) -> Result<CreateResponse> {
    Err(Self::refuse("Creating items"))
  }

  fn attachment_simple(&self, _attachments: &[Attachment], _parent_key: &str) -> Result<()> {
    Err(Self::refuse("Uploading attachments"))
  }

  fn collections(&self) -> Result<Vec<RemoteCollection>> { Err(Self::refuse("Listing collections")) }

  fn create_collection(&self, _names: &[String]) -> Result<()> {
    Err(Self::refuse("Creating collections"))
  }

  fn addto_collection(&self, _collection_key: &str, _item_key: &str) -> Result<()> {
    Err(Self::refuse("Adding to collections"))
  }
}
