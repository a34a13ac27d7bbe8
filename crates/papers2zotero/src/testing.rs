//! Test fixtures: a throwaway Papers2 library and a recording Zotero mock.

use std::{cell::RefCell, rc::Rc};

use rusqlite::{params, Connection, OptionalExtension};
use tempfile::TempDir;

use super::*;

const SCHEMA: &str =
  include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/papers2.sql"));

/// A Papers2 library folder in a temporary directory.
///
/// Publications get the uuid `uuid-<id>` and the title `Publication <id>`.
pub struct Fixture {
  dir:  TempDir,
  conn: Connection,
}

impl Fixture {
  pub fn new() -> Result<Self> {
    let dir = tempdir()?;
    let db_path = Papers2::database_path(dir.path());
    if let Some(parent) = db_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&db_path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { dir, conn })
  }

  pub fn folder(&self) -> &Path { self.dir.path() }

  pub fn library(&self) -> Papers2 { Papers2::new(self.folder()) }

  pub fn exec(&self, sql: &str) -> Result<()> {
    self.conn.execute_batch(sql)?;
    Ok(())
  }

  pub fn publication(&self, id: i64, subtype: i64) -> Result<()> {
    self.conn.execute(
      "INSERT INTO Publication (ROWID, uuid, subtype, title) VALUES (?1, ?2, ?3, ?4)",
      params![id, format!("uuid-{id}"), subtype, format!("Publication {id}")],
    )?;
    Ok(())
  }

  pub fn author(
    &self,
    publication_id: i64,
    priority: i64,
    prename: &str,
    surname: &str,
    institutional: i64,
    kind: i64,
  ) -> Result<()> {
    self.conn.execute(
      "INSERT INTO Author (prename, surname, institutional) VALUES (?1, ?2, ?3)",
      params![prename, surname, institutional],
    )?;
    let author_id = self.conn.last_insert_rowid();
    self.conn.execute(
      "INSERT INTO OrderedAuthor (author_id, object_id, priority, type) VALUES (?1, ?2, ?3, ?4)",
      params![author_id, publication_id, priority, kind],
    )?;
    Ok(())
  }

  pub fn sync_event(
    &self,
    publication_id: i64,
    source_id: &str,
    remote_id: &str,
    updated_at: f64,
  ) -> Result<()> {
    self.conn.execute(
      "INSERT INTO SyncEvent (device_id, source_id, remote_id, updated_at) VALUES (?1, ?2, ?3, ?4)",
      params![format!("uuid-{publication_id}"), source_id, remote_id, updated_at],
    )?;
    Ok(())
  }

  pub fn keyword(&self, publication_id: i64, name: &str, kind: KeywordType) -> Result<()> {
    let existing: Option<i64> = self
      .conn
      .query_row("SELECT ROWID FROM Keyword WHERE name = ?1", params![name], |row| row.get(0))
      .optional()?;
    let keyword_id = match existing {
      Some(id) => id,
      None => {
        self.conn.execute("INSERT INTO Keyword (name) VALUES (?1)", params![name])?;
        self.conn.last_insert_rowid()
      },
    };
    self.conn.execute(
      "INSERT INTO KeywordItem (keyword_id, object_id, type) VALUES (?1, ?2, ?3)",
      params![keyword_id, publication_id, kind.code()],
    )?;
    Ok(())
  }

  pub fn collection(
    &self,
    publication_id: i64,
    collection_id: i64,
    name: &str,
    kind: i64,
  ) -> Result<()> {
    self.conn.execute(
      "INSERT OR IGNORE INTO Collection (ROWID, name, type) VALUES (?1, ?2, ?3)",
      params![collection_id, name, kind],
    )?;
    self.conn.execute(
      "INSERT INTO CollectionItem (collection, object_id) VALUES (?1, ?2)",
      params![collection_id, publication_id],
    )?;
    Ok(())
  }

  pub fn review(&self, publication_id: i64, content: &str, rating: i64, mine: bool) -> Result<()> {
    self.conn.execute(
      "INSERT INTO Review (object_id, content, rating, is_mine) VALUES (?1, ?2, ?3, ?4)",
      params![publication_id, content, rating, mine],
    )?;
    Ok(())
  }

  pub fn attachment(&self, publication_id: i64, path: &str, primary: bool) -> Result<()> {
    self.conn.execute(
      "INSERT INTO PDF (object_id, path, is_primary) VALUES (?1, ?2, ?3)",
      params![publication_id, path, primary],
    )?;
    Ok(())
  }
}

/// What the mock has seen, and how it should answer.
#[derive(Default)]
pub struct MockState {
  /// Items of every `create_items` call
  pub created:             Vec<Vec<Item>>,
  /// `(parent key, files)` of every `attachment_simple` call
  pub attachments:         Vec<(String, Vec<Attachment>)>,
  /// `(collection key, item key)` of every `addto_collection` call
  pub links:               Vec<(String, String)>,
  pub created_collections: Vec<String>,
  pub remote_collections:  Vec<RemoteCollection>,
  pub collection_listings: usize,
  /// Items with these titles are reported as failed
  pub fail_titles:         BTreeSet<String>,
  /// Items with these titles are reported as unchanged
  pub unchanged_titles:    BTreeSet<String>,
  /// Every `create_items` call fails outright
  pub fail_create:         bool,
  /// Every `check_items` call fails
  pub fail_check:          bool,
  next_key:                usize,
}

/// A [`ZoteroApi`] that records calls instead of making them.
///
/// Clones share state, so a test can keep one handle while the importer owns another.
#[derive(Clone, Default)]
pub struct MockZotero {
  pub state: Rc<RefCell<MockState>>,
}

impl MockZotero {
  pub fn new() -> Self { Self::default() }

  /// Every item created so far that isn't a note.
  pub fn created_items(&self) -> Vec<Item> {
    self
      .state
      .borrow()
      .created
      .iter()
      .flatten()
      .filter(|item| item["itemType"] != "note")
      .cloned()
      .collect()
  }
}

impl ZoteroApi for MockZotero {
  fn item_template(&self, item_type: ItemType) -> Result<Item> { Ok(item_type.local_template()) }

  fn check_items(&self, items: &[Item]) -> Result<()> {
    if self.state.borrow().fail_check {
      return Err(MigrateError::InvalidBatch("rejected by mock".into()));
    }
    validate_items(items, |item_type| self.item_template(item_type))
  }

  fn create_items(&self, items: &[Item]) -> Result<CreateResponse> {
    let mut state = self.state.borrow_mut();
    if state.fail_create {
      return Err(MigrateError::Api { status: 503, message: "Service Unavailable".into() });
    }

    let mut response = CreateResponse::default();
    for (idx, item) in items.iter().enumerate() {
      let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
      if state.fail_titles.contains(title) {
        response.failed.insert(idx.to_string(), FailedItem {
          code:    400,
          message: format!("Invalid item {title}"),
        });
        continue;
      }
      state.next_key += 1;
      let key = format!("ITEM{:04}", state.next_key);
      if state.unchanged_titles.contains(title) {
        response.unchanged.insert(idx.to_string(), key);
      } else {
        response.success.insert(idx.to_string(), key);
      }
    }
    state.created.push(items.to_vec());
    Ok(response)
  }

  fn attachment_simple(&self, attachments: &[Attachment], parent_key: &str) -> Result<()> {
    self.state.borrow_mut().attachments.push((parent_key.to_string(), attachments.to_vec()));
    Ok(())
  }

  fn collections(&self) -> Result<Vec<RemoteCollection>> {
    let mut state = self.state.borrow_mut();
    state.collection_listings += 1;
    Ok(state.remote_collections.clone())
  }

  fn create_collection(&self, names: &[String]) -> Result<()> {
    let mut state = self.state.borrow_mut();
    for name in names {
      let key = format!("COLL{:04}", state.remote_collections.len() + 1);
      state.remote_collections.push(RemoteCollection { key, name: name.clone() });
      state.created_collections.push(name.clone());
    }
    Ok(())
  }

  fn addto_collection(&self, collection_key: &str, item_key: &str) -> Result<()> {
    self.state.borrow_mut().links.push((collection_key.to_string(), item_key.to_string()));
    Ok(())
  }
}
