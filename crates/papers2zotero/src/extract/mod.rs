//! Field extraction: turning a Papers2 publication into a Zotero item.
//!
//! Each Zotero field the migration fills has one [`FieldRule`] in [`FIELD_RULES`]. A rule names
//! its [`Source`] (a column read or a lookup through the [`Library`]), its [`Arity`] (one value, a
//! fixed range or a list) and the [`Format`] applied to every value that survives. Fields are
//! filled only when the item type allows them ([`ItemType::fields`]); a field with no rule, or a
//! rule that produces nothing, keeps the template default.
//!
//! Notes and attachments are not item fields. They are extracted alongside the item by
//! [`extract_notes`] and [`select_attachments`] and uploaded as children once the parent exists.
//!
//! # Examples
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use papers2zotero::{
//!   config::{AttachmentPolicy, KeywordSource},
//!   extract::{extract_entry, ExtractionContext},
//!   papers2::Papers2,
//!   zotero::OfflineClient,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let papers2 = Papers2::new(Papers2::default_folder());
//! let ctx = ExtractionContext {
//!   library:         &papers2,
//!   client:          &OfflineClient,
//!   keyword_sources: &[KeywordSource::User],
//!   label_map:       &BTreeMap::new(),
//!   collections:     &BTreeMap::new(),
//!   attachments:     AttachmentPolicy::None,
//! };
//! if let Some(publication) = papers2.publication(1)? {
//!   let entry = extract_entry(&publication, &ctx)?;
//!   println!("{}", serde_json::to_string_pretty(&entry.item)?);
//! }
//! # Ok(())
//! # }
//! ```

use super::*;

mod rules;

pub use self::rules::*;

/// Everything a rule may consult besides the publication itself.
///
/// Built once per record by the importer and never changed while the record is extracted.
#[derive(Clone, Copy)]
pub struct ExtractionContext<'a> {
  /// The source library
  pub library:         &'a dyn Library,
  /// The destination, used for note templates
  pub client:          &'a dyn ZoteroApi,
  /// Keyword vocabularies that become tags
  pub keyword_sources: &'a [KeywordSource],
  /// Tag name for each label; labels missing here produce no tag
  pub label_map:       &'a BTreeMap<Label, String>,
  /// Allowed collection names and their Zotero keys
  pub collections:     &'a BTreeMap<String, String>,
  /// Which attached files to upload
  pub attachments:     AttachmentPolicy,
}

impl ExtractionContext<'_> {
  /// Tag names of a publication: user keywords, then automatic keywords, then the label tag,
  /// each only when enabled.
  pub fn keywords(&self, publication: &Publication) -> Result<Vec<String>> {
    let mut keywords = Vec::new();
    if self.keyword_sources.contains(&KeywordSource::User) {
      keywords.extend(self.library.keywords(publication, KeywordType::User)?);
    }
    if self.keyword_sources.contains(&KeywordSource::Auto) {
      keywords.extend(self.library.keywords(publication, KeywordType::Auto)?);
    }
    if self.keyword_sources.contains(&KeywordSource::Label) {
      if let Some(tag) = self.label_map.get(&publication.label()?) {
        keywords.push(tag.clone());
      }
    }
    Ok(keywords)
  }

  /// Zotero keys of the allowed collections containing the publication.
  pub fn collection_keys(&self, publication: &Publication) -> Result<Vec<String>> {
    if self.collections.is_empty() {
      return Ok(Vec::new());
    }
    let mut keys = Vec::new();
    for collection in self.library.collections(Some(publication))? {
      if let Some(key) = self.collections.get(&collection.name) {
        if !keys.contains(key) {
          keys.push(key.clone());
        }
      }
    }
    Ok(keys)
  }
}

/// Fills the allowed fields of an `item_type` template from a publication.
pub fn populate(
  item_type: ItemType,
  mut item: Item,
  publication: &Publication,
  ctx: &ExtractionContext<'_>,
) -> Result<Item> {
  for field in item_type.fields() {
    if !item.contains_key(*field) {
      trace!(field, item_type = %item_type, "Template lacks allowed field");
      continue;
    }
    let Some(rule) = rule_for(field) else { continue };
    if let Some(value) = rule.extract(publication, ctx)? {
      item.insert((*field).to_string(), value);
    }
  }
  Ok(item)
}

/// Child notes of a publication: its free text note, then one note per review.
pub fn extract_notes(publication: &Publication, ctx: &ExtractionContext<'_>) -> Result<Vec<Item>> {
  let mut texts = Vec::new();
  if let Some(note) = publication.notes.as_deref().filter(|note| !note.trim().is_empty()) {
    texts.push(note.to_string());
  }
  for review in ctx.library.reviews(publication)? {
    texts.push(format!("{} Rating: {}", review.content, review.rating));
  }

  let mut notes = Vec::with_capacity(texts.len());
  for text in texts {
    let mut note = ctx.client.item_template(ItemType::Note)?;
    note.insert("note".into(), Value::String(text));
    notes.push(note);
  }
  Ok(notes)
}

/// Attached files selected by `policy`.
pub fn select_attachments(
  publication: &Publication,
  library: &dyn Library,
  policy: AttachmentPolicy,
) -> Result<Vec<Attachment>> {
  match policy {
    AttachmentPolicy::All => library.attachments(publication),
    AttachmentPolicy::Unread if publication.times_read == 0 => library.attachments(publication),
    AttachmentPolicy::Unread | AttachmentPolicy::None => Ok(Vec::new()),
  }
}

/// Extracts a complete batch entry: the item, its notes, its attachments and the collections it
/// should be added to.
pub fn extract_entry(publication: &Publication, ctx: &ExtractionContext<'_>) -> Result<BatchEntry> {
  let item_type = ItemType::for_publication(publication)?;
  let template = ctx.client.item_template(item_type)?;
  let item = populate(item_type, template, publication, ctx)?;

  let collections = item
    .get("collections")
    .and_then(Value::as_array)
    .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
    .unwrap_or_default();

  Ok(BatchEntry {
    publication_id: publication.id,
    item,
    notes: extract_notes(publication, ctx)?,
    attachments: select_attachments(publication, ctx.library, ctx.attachments)?,
    collections,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::*;

  fn context<'a>(
    library: &'a Papers2,
    label_map: &'a BTreeMap<Label, String>,
    collections: &'a BTreeMap<String, String>,
  ) -> ExtractionContext<'a> {
    ExtractionContext {
      library,
      client: &OfflineClient,
      keyword_sources: &[KeywordSource::User, KeywordSource::Label],
      label_map,
      collections,
      attachments: AttachmentPolicy::All,
    }
  }

  #[traced_test]
  #[test]
  fn test_journal_article_fields() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.exec(
      "UPDATE Publication SET title = 'On Computable Numbers', bundle_string = 'Proc. LMS',
         abbreviation = 'PLMS', volume = '42', number = '2', startpage = '230', endpage = '265',
         doi = '10.1112/plms/s2-42.1.230', publication_date = '99193611121200000000222000',
         imported_date = 1234567890, label = 1, summary = ''
       WHERE ROWID = 1",
    )?;
    fixture.author(1, 1, "Alan", "Turing", 0, 0)?;
    fixture.sync_event(1, IdSource::Pubmed.source_id(), "12345", 1.0)?;
    fixture.sync_event(1, "com.example.web", "https://example.com/turing", 1.0)?;
    fixture.keyword(1, "computability", KeywordType::User)?;
    fixture.keyword(1, "Humans", KeywordType::Auto)?;

    let library = fixture.library();
    let labels = BTreeMap::from([(Label::Red, "LabelRed".to_string())]);
    let collections = BTreeMap::new();
    let ctx = context(&library, &labels, &collections);
    let publication = library.publication(1)?.unwrap();

    let entry = extract_entry(&publication, &ctx)?;
    let item = &entry.item;
    assert_eq!(item["itemType"], "journalArticle");
    assert_eq!(item["title"], "On Computable Numbers");
    assert_eq!(item["publicationTitle"], "Proc. LMS");
    assert_eq!(item["journalAbbreviation"], "PLMS");
    assert_eq!(item["volume"], "42");
    assert_eq!(item["issue"], "2");
    assert_eq!(item["pages"], "230-265");
    assert_eq!(item["DOI"], "10.1112/plms/s2-42.1.230");
    assert_eq!(item["date"], "1936-11-12");
    assert_eq!(item["accessDate"], "2009-02-13 23:31:30");
    assert_eq!(item["extra"], "PMID: 12345");
    assert_eq!(item["url"], "https://example.com/turing");
    assert_eq!(item["abstractNote"], "");
    assert_eq!(item["creators"], json!([
      { "creatorType": "author", "firstName": "Alan", "lastName": "Turing" }
    ]));
    assert_eq!(item["tags"], json!([{ "tag": "computability" }, { "tag": "LabelRed" }]));
    assert!(!item.contains_key("numPages"));
    assert!(entry.notes.is_empty());
    assert!(entry.collections.is_empty());
    Ok(())
  }

  #[test]
  fn test_creators_follow_author_priority() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::Book.code())?;
    fixture.author(1, 3, "Grace", "Hopper", 0, 1)?;
    fixture.author(1, 0, "Ada", "Lovelace", 0, 0)?;
    fixture.author(1, 2, "", "CERN", 1, 1)?;
    fixture.author(1, 1, "", "Royal Society", 1, 0)?;

    let library = fixture.library();
    let labels = BTreeMap::new();
    let collections = BTreeMap::new();
    let ctx = context(&library, &labels, &collections);
    let publication = library.publication(1)?.unwrap();

    let entry = extract_entry(&publication, &ctx)?;
    assert_eq!(entry.item["creators"], json!([
      { "creatorType": "author", "firstName": "Ada", "lastName": "Lovelace" },
      { "creatorType": "author", "name": "Royal Society" },
      { "creatorType": "editor", "name": "CERN" },
      { "creatorType": "editor", "firstName": "Grace", "lastName": "Hopper" }
    ]));
    Ok(())
  }

  #[test]
  fn test_incomplete_range_and_fallbacks() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.exec(
      "UPDATE Publication SET endpage = '20', bundle_string = '', abbreviation = 'J. Irrepr.'
       WHERE ROWID = 1",
    )?;
    fixture.publication(2, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET startpage = '312' WHERE ROWID = 2")?;
    fixture.sync_event(2, IdSource::Issn.source_id(), "1234-5678", 1.0)?;

    let library = fixture.library();
    let (labels, collections) = (BTreeMap::new(), BTreeMap::new());
    let ctx = context(&library, &labels, &collections);

    let article = extract_entry(&library.publication(1)?.unwrap(), &ctx)?.item;
    assert_eq!(article["pages"], "");
    assert_eq!(article["publicationTitle"], "J. Irrepr.");
    assert_eq!(article["tags"], json!([]));

    let book = extract_entry(&library.publication(2)?.unwrap(), &ctx)?.item;
    assert_eq!(book["itemType"], "book");
    assert_eq!(book["numPages"], "312");
    assert_eq!(book["ISBN"], "1234-5678");
    assert!(!book.contains_key("pages"));
    Ok(())
  }

  #[test]
  fn test_record_errors() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::Book.code())?;
    fixture.author(1, 1, "Ada", "Lovelace", 0, 3)?;
    fixture.publication(2, -1)?;
    fixture.publication(3, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET label = 12 WHERE ROWID = 3")?;

    let library = fixture.library();
    let (labels, collections) = (BTreeMap::new(), BTreeMap::new());
    let ctx = context(&library, &labels, &collections);

    let err = extract_entry(&library.publication(1)?.unwrap(), &ctx).unwrap_err();
    assert!(matches!(err, MigrateError::UnsupportedAuthorType(3)));
    let err = extract_entry(&library.publication(2)?.unwrap(), &ctx).unwrap_err();
    assert!(matches!(err, MigrateError::UnmappedPublicationType(-1)));
    let err = extract_entry(&library.publication(3)?.unwrap(), &ctx).unwrap_err();
    assert!(matches!(err, MigrateError::UnknownLabel(12)));
    Ok(())
  }

  #[test]
  fn test_notes_and_reviews() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET notes = 'Read chapter 3' WHERE ROWID = 1")?;
    fixture.review(1, "Thorough", 5, true)?;
    fixture.publication(2, PubType::Book.code())?;
    fixture.exec("UPDATE Publication SET notes = '   ' WHERE ROWID = 2")?;

    let library = fixture.library();
    let (labels, collections) = (BTreeMap::new(), BTreeMap::new());
    let ctx = context(&library, &labels, &collections);

    let notes = extract_notes(&library.publication(1)?.unwrap(), &ctx)?;
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0]["itemType"], "note");
    assert_eq!(notes[0]["note"], "Read chapter 3");
    assert_eq!(notes[1]["note"], "Thorough Rating: 5");

    assert!(extract_notes(&library.publication(2)?.unwrap(), &ctx)?.is_empty());
    Ok(())
  }

  #[test]
  fn test_attachment_policies() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::Book.code())?;
    fixture.attachment(1, "Files/read.pdf", true)?;
    fixture.exec("UPDATE Publication SET times_read = 3 WHERE ROWID = 1")?;
    fixture.publication(2, PubType::Book.code())?;
    fixture.attachment(2, "Files/unread.pdf", true)?;

    let library = fixture.library();
    let read = library.publication(1)?.unwrap();
    let unread = library.publication(2)?.unwrap();

    assert_eq!(select_attachments(&read, &library, AttachmentPolicy::All)?.len(), 1);
    assert!(select_attachments(&read, &library, AttachmentPolicy::Unread)?.is_empty());
    assert_eq!(select_attachments(&unread, &library, AttachmentPolicy::Unread)?.len(), 1);
    assert!(select_attachments(&unread, &library, AttachmentPolicy::None)?.is_empty());
    Ok(())
  }

  #[test]
  fn test_collections_and_labels() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.publication(1, PubType::JournalArticle.code())?;
    fixture.collection(1, 10, "Thesis", 0)?;
    fixture.collection(1, 11, "Teaching", 0)?;

    let library = fixture.library();
    let labels = BTreeMap::from([(Label::Red, "LabelRed".to_string())]);
    let collections = BTreeMap::from([("Thesis".to_string(), "THESKEY1".to_string())]);
    let ctx = context(&library, &labels, &collections);

    let entry = extract_entry(&library.publication(1)?.unwrap(), &ctx)?;
    assert_eq!(entry.item["collections"], json!(["THESKEY1"]));
    assert_eq!(entry.collections, vec!["THESKEY1"]);
    // label 0 is `None`, which never maps to a tag
    assert_eq!(entry.item["tags"], json!([]));
    Ok(())
  }
}
