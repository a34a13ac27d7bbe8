//! Read-only access to a Papers2 library.
//!
//! Papers2 keeps its library in a SQLite database inside the library folder at
//! `Library.papers2/Database.papersdb`. This module exposes the handful of queries the migration
//! needs through the [`Library`] trait and implements it for [`Papers2`].
//!
//! The connection is opened lazily on the first query and released by [`Library::close`].
//! Nothing in this module ever writes to the database.
//!
//! # Examples
//!
//! ```no_run
//! use papers2zotero::papers2::{Library, Papers2, PublicationFilter};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let papers2 = Papers2::new(Papers2::default_folder());
//! for publication in papers2.publications(&PublicationFilter::default())? {
//!   let publication = publication?;
//!   println!("{} by {:?}", publication.describe(), papers2.authors(&publication)?);
//! }
//! papers2.close()?;
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;

use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use super::*;

mod record;
mod schema;

pub use self::{record::*, schema::*};

/// Which publications to read from the library.
///
/// The default selects every publication that is neither marked deleted nor marked duplicate.
#[derive(Debug, Clone, Default)]
pub struct PublicationFilter {
  /// Only publications of these types
  pub types:              Option<Vec<PubType>>,
  /// Only publications with these ids
  pub ids:                Option<Vec<i64>>,
  /// Also select publications in the trash
  pub include_deleted:    bool,
  /// Also select publications marked as duplicates
  pub include_duplicates: bool,
}

/// Lazily evaluated sequence of publications.
pub type Publications<'a> = Box<dyn Iterator<Item = Result<Publication>> + 'a>;

/// Read-only queries over a reference library.
pub trait Library {
  /// Publications matching `filter`, in id order.
  fn publications(&self, filter: &PublicationFilter) -> Result<Publications<'_>>;

  /// Authors of a publication, in their listed order.
  fn authors(&self, publication: &Publication) -> Result<Vec<Author>>;

  /// Identifiers of a publication within one namespace.
  fn identifiers(&self, publication: &Publication, source: IdSource) -> Result<Vec<String>>;

  /// URLs of a publication, most recently updated first.
  fn urls(&self, publication: &Publication) -> Result<Vec<String>>;

  /// Keyword names of a publication from one vocabulary.
  fn keywords(&self, publication: &Publication, kind: KeywordType) -> Result<Vec<String>>;

  /// Collections containing `publication`, or every collection when `None`.
  fn collections(&self, publication: Option<&Publication>) -> Result<Vec<Collection>>;

  /// The user's own reviews of a publication.
  fn reviews(&self, publication: &Publication) -> Result<Vec<Review>>;

  /// Attached files, primary attachment first.
  fn attachments(&self, publication: &Publication) -> Result<Vec<Attachment>>;

  /// Releases any open connection. Further queries reopen it.
  fn close(&self) -> Result<()>;
}

/// Columns selected for every publication query, in [`publication_from_row`] order.
const PUBLICATION_COLUMNS: &str = "ROWID, uuid, subtype, publication_date, author_string, title, \
                                   summary, bundle_string, abbreviation, volume, number, \
                                   startpage, endpage, doi, version, language, document_number, \
                                   place, publisher, copyright, notes, imported_date, label, \
                                   times_read, marked_deleted, marked_duplicate";

/// Collection types Papers2 uses for user created collections.
const USER_COLLECTION_TYPES: [i64; 2] = [0, 5];

/// Handle to a Papers2 library folder.
pub struct Papers2 {
  folder: PathBuf,
  conn:   RefCell<Option<Connection>>,
}

impl Papers2 {
  /// Creates a handle for the library in `folder`. No file is touched until the first query.
  pub fn new(folder: impl AsRef<Path>) -> Self {
    Self { folder: folder.as_ref().to_path_buf(), conn: RefCell::new(None) }
  }

  /// Returns the default location of the Papers2 library folder.
  ///
  /// - On macOS: `~/Documents/Papers2`
  /// - Fallback: `./Papers2` in the current directory
  pub fn default_folder() -> PathBuf {
    dirs::document_dir().unwrap_or_else(|| PathBuf::from(".")).join("Papers2")
  }

  /// Path of the SQLite database inside a library folder.
  pub fn database_path(folder: impl AsRef<Path>) -> PathBuf {
    folder.as_ref().join("Library.papers2").join("Database.papersdb")
  }

  /// The library folder this handle reads from.
  pub fn folder(&self) -> &Path { &self.folder }

  /// Runs `f` against the connection, opening it read-only first if needed.
  fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let mut slot = self.conn.borrow_mut();
    if let Some(conn) = slot.as_ref() {
      return f(conn);
    }

    let path = Self::database_path(&self.folder);
    debug!(path = %path.display(), "Opening Papers2 database");
    let conn = Connection::open_with_flags(
      &path,
      OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    f(slot.insert(conn))
  }

  /// Loads a single publication by id.
  pub fn publication(&self, id: i64) -> Result<Option<Publication>> {
    self.with_conn(|conn| {
      let sql = format!("SELECT {PUBLICATION_COLUMNS} FROM Publication WHERE ROWID = ?1");
      Ok(conn.query_row(&sql, params![id], publication_from_row).optional()?)
    })
  }

  /// Ids of all publications matching `filter`.
  fn publication_ids(&self, filter: &PublicationFilter) -> Result<Vec<i64>> {
    let mut criteria = Vec::new();
    let mut values: Vec<i64> = Vec::new();

    if let Some(types) = &filter.types {
      criteria.push(format!("subtype IN ({})", placeholders(values.len(), types.len())));
      values.extend(types.iter().map(|t| t.code()));
    }
    if let Some(ids) = &filter.ids {
      criteria.push(format!("ROWID IN ({})", placeholders(values.len(), ids.len())));
      values.extend(ids.iter().copied());
    }
    if !filter.include_deleted {
      criteria.push("marked_deleted = 0".to_string());
    }
    if !filter.include_duplicates {
      criteria.push("marked_duplicate = 0".to_string());
    }

    let mut sql = "SELECT ROWID FROM Publication".to_string();
    if !criteria.is_empty() {
      sql.push_str(" WHERE ");
      sql.push_str(&criteria.join(" AND "));
    }
    sql.push_str(" ORDER BY ROWID");
    trace!(sql = %sql, "Selecting publications");

    self.with_conn(|conn| {
      let mut stmt = conn.prepare(&sql)?;
      let ids = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(ids)
    })
  }

  /// Runs a query returning one string column per row.
  fn strings(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<String>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare_cached(sql)?;
      let rows = stmt
        .query_map(params, |row| row.get::<_, Option<String>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows.into_iter().flatten().collect())
    })
  }
}

impl Library for Papers2 {
  fn publications(&self, filter: &PublicationFilter) -> Result<Publications<'_>> {
    let ids = self.publication_ids(filter)?;
    debug!(count = ids.len(), "Selected publications");
    Ok(Box::new(ids.into_iter().filter_map(move |id| self.publication(id).transpose())))
  }

  fn authors(&self, publication: &Publication) -> Result<Vec<Author>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare_cached(
        "SELECT a.prename, a.surname, a.institutional, o.type
         FROM OrderedAuthor o
         JOIN Author a ON a.ROWID = o.author_id
         WHERE o.object_id = ?1
         ORDER BY o.priority",
      )?;
      let authors = stmt
        .query_map(params![publication.id], |row| {
          Ok(Author {
            prename:       row.get(0)?,
            surname:       row.get(1)?,
            institutional: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
            kind:          row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(authors)
    })
  }

  fn identifiers(&self, publication: &Publication, source: IdSource) -> Result<Vec<String>> {
    let Some(uuid) = &publication.uuid else { return Ok(Vec::new()) };
    self.strings(
      "SELECT remote_id FROM SyncEvent WHERE device_id = ?1 AND source_id = ?2",
      params![uuid, source.source_id()],
    )
  }

  fn urls(&self, publication: &Publication) -> Result<Vec<String>> {
    let Some(uuid) = &publication.uuid else { return Ok(Vec::new()) };
    self.strings(
      "SELECT remote_id FROM SyncEvent
       WHERE device_id = ?1 AND remote_id LIKE 'http%'
       ORDER BY updated_at DESC",
      params![uuid],
    )
  }

  fn keywords(&self, publication: &Publication, kind: KeywordType) -> Result<Vec<String>> {
    self.strings(
      "SELECT k.name FROM Keyword k
       JOIN KeywordItem i ON k.ROWID = i.keyword_id
       WHERE i.object_id = ?1 AND i.type = ?2",
      params![publication.id, kind.code()],
    )
  }

  fn collections(&self, publication: Option<&Publication>) -> Result<Vec<Collection>> {
    self.with_conn(|conn| {
      let [first_type, second_type] = USER_COLLECTION_TYPES;
      let (sql, params) = match publication {
        Some(publication) => (
          "SELECT c.ROWID, c.name FROM Collection c
           JOIN CollectionItem i ON c.ROWID = i.collection
           WHERE c.type IN (?1, ?2) AND i.object_id = ?3
           ORDER BY c.ROWID",
          vec![first_type, second_type, publication.id],
        ),
        None => (
          "SELECT ROWID, name FROM Collection WHERE type IN (?1, ?2) ORDER BY ROWID",
          vec![first_type, second_type],
        ),
      };
      let mut stmt = conn.prepare_cached(sql)?;
      let collections = stmt
        .query_map(params_from_iter(params), |row| {
          Ok(Collection { id: row.get(0)?, name: row.get(1)? })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(collections)
    })
  }

  fn reviews(&self, publication: &Publication) -> Result<Vec<Review>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare_cached(
        "SELECT content, rating FROM Review WHERE object_id = ?1 AND is_mine = 1 ORDER BY ROWID",
      )?;
      let reviews = stmt
        .query_map(params![publication.id], |row| {
          Ok(Review {
            content: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            rating:  row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(reviews)
    })
  }

  fn attachments(&self, publication: &Publication) -> Result<Vec<Attachment>> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare_cached(
        "SELECT path, mime_type FROM PDF WHERE object_id = ?1 ORDER BY is_primary DESC, ROWID",
      )?;
      let attachments = stmt
        .query_map(params![publication.id], |row| {
          Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(
        attachments
          .into_iter()
          .map(|(path, content_type)| Attachment {
            path:         self.folder.join(path),
            content_type: content_type.unwrap_or_else(|| "application/pdf".to_string()),
          })
          .collect(),
      )
    })
  }

  fn close(&self) -> Result<()> {
    if let Some(conn) = self.conn.borrow_mut().take() {
      debug!("Closing Papers2 database");
      conn.close().map_err(|(_, e)| MigrateError::from(e))?;
    }
    Ok(())
  }
}

/// `?N` placeholders for `count` values following `offset` already bound ones.
fn placeholders(offset: usize, count: usize) -> String {
  (offset + 1..=offset + count).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Maps a row selected with [`PUBLICATION_COLUMNS`] onto a [`Publication`].
fn publication_from_row(row: &Row<'_>) -> rusqlite::Result<Publication> {
  Ok(Publication {
    id:               row.get(0)?,
    uuid:             row.get(1)?,
    subtype:          row.get(2)?,
    publication_date: row.get(3)?,
    author_string:    row.get(4)?,
    title:            row.get(5)?,
    summary:          row.get(6)?,
    bundle_string:    row.get(7)?,
    abbreviation:     row.get(8)?,
    volume:           row.get(9)?,
    number:           row.get(10)?,
    startpage:        row.get(11)?,
    endpage:          row.get(12)?,
    doi:              row.get(13)?,
    version:          row.get(14)?,
    language:         row.get(15)?,
    document_number:  row.get(16)?,
    place:            row.get(17)?,
    publisher:        row.get(18)?,
    copyright:        row.get(19)?,
    notes:            row.get(20)?,
    imported_date:    row.get(21)?,
    label:            row.get::<_, Option<i64>>(22)?.unwrap_or_default(),
    times_read:       row.get::<_, Option<i64>>(23)?.unwrap_or_default(),
    marked_deleted:   row.get::<_, Option<bool>>(24)?.unwrap_or_default(),
    marked_duplicate: row.get::<_, Option<bool>>(25)?.unwrap_or_default(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::*;

  #[traced_test]
  #[test]
  fn test_publications_skip_deleted_and_duplicates() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.publication(2, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET marked_deleted = 1 WHERE ROWID = 2")?;
    fixture.publication(3, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET marked_duplicate = 1 WHERE ROWID = 3")?;

    let library = fixture.library();
    let ids = library
      .publications(&PublicationFilter::default())?
      .map(|p| p.map(|p| p.id))
      .collect::<Result<Vec<_>>>()?;
    assert_eq!(ids, vec![1]);

    let filter = PublicationFilter {
      include_deleted: true,
      include_duplicates: true,
      ..Default::default()
    };
    assert_eq!(library.publications(&filter)?.count(), 3);
    Ok(())
  }

  #[test]
  fn test_publications_filter_by_type_and_id() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.publication(2, PubType::Book.code())?;
    fixture.publication(3, PubType::JournalArticle.code())?;
    let library = fixture.library();

    let filter =
      PublicationFilter { types: Some(vec![PubType::JournalArticle]), ..Default::default() };
    let ids = library.publications(&filter)?.map(|p| p.unwrap().id).collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 3]);

    let filter = PublicationFilter {
      types: Some(vec![PubType::JournalArticle]),
      ids: Some(vec![2, 3]),
      ..Default::default()
    };
    let ids = library.publications(&filter)?.map(|p| p.unwrap().id).collect::<Vec<_>>();
    assert_eq!(ids, vec![3]);
    Ok(())
  }

  #[test]
  fn test_authors_in_priority_order() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.author(1, 2, "Grace", "Hopper", 0, 0)?;
    fixture.author(1, 1, "Ada", "Lovelace", 0, 0)?;
    fixture.author(1, 3, "", "CERN", 1, 1)?;

    let library = fixture.library();
    let publication = library.publication(1)?.unwrap();
    let authors = library.authors(&publication)?;
    let surnames: Vec<_> = authors.iter().map(|a| a.surname.clone().unwrap()).collect();
    assert_eq!(surnames, vec!["Lovelace", "Hopper", "CERN"]);
    assert_eq!(authors[2].institutional, 1);
    assert_eq!(authors[2].kind, 1);
    Ok(())
  }

  #[test]
  fn test_identifiers_and_urls() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.sync_event(1, IdSource::Pubmed.source_id(), "12345", 10.0)?;
    fixture.sync_event(1, "com.example.web", "http://old.example.com", 1.0)?;
    fixture.sync_event(1, "com.example.web", "https://new.example.com", 5.0)?;

    let library = fixture.library();
    let publication = library.publication(1)?.unwrap();
    assert_eq!(library.identifiers(&publication, IdSource::Pubmed)?, vec!["12345"]);
    assert!(library.identifiers(&publication, IdSource::Isbn)?.is_empty());
    assert_eq!(library.urls(&publication)?, vec![
      "https://new.example.com",
      "http://old.example.com"
    ]);
    Ok(())
  }

  #[test]
  fn test_keywords_collections_reviews_attachments() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.keyword(1, "genomics", KeywordType::User)?;
    fixture.keyword(1, "Humans", KeywordType::Auto)?;
    fixture.collection(1, 10, "Thesis", 0)?;
    fixture.collection(1, 11, "Smart group", 3)?;
    fixture.review(1, "Solid work", 4, true)?;
    fixture.review(1, "Someone else's opinion", 1, false)?;
    fixture.attachment(1, "Files/b.pdf", false)?;
    fixture.attachment(1, "Files/a.pdf", true)?;

    let library = fixture.library();
    let publication = library.publication(1)?.unwrap();
    assert_eq!(library.keywords(&publication, KeywordType::User)?, vec!["genomics"]);
    assert_eq!(library.keywords(&publication, KeywordType::Auto)?, vec!["Humans"]);

    let collections = library.collections(Some(&publication))?;
    assert_eq!(collections, vec![Collection { id: 10, name: "Thesis".into() }]);
    assert_eq!(library.collections(None)?.len(), 1);

    assert_eq!(library.reviews(&publication)?, vec![Review {
      content: "Solid work".into(),
      rating:  4,
    }]);

    let attachments = library.attachments(&publication)?;
    assert_eq!(attachments[0].path, fixture.folder().join("Files/a.pdf"));
    assert_eq!(attachments[1].path, fixture.folder().join("Files/b.pdf"));
    assert_eq!(attachments[0].content_type, "application/pdf");
    Ok(())
  }

  #[test]
  fn test_close_and_reopen() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::Book.code())?;
    let library = fixture.library();
    assert!(library.publication(1)?.is_some());
    library.close()?;
    assert!(library.publication(1)?.is_some());
    library.close()?;
    Ok(())
  }

  #[test]
  fn test_missing_database() {
    let dir = tempdir().unwrap();
    let library = Papers2::new(dir.path());
    assert!(matches!(
      library.publications(&PublicationFilter::default()),
      Err(MigrateError::Sqlite(_))
    ));
  }
}
