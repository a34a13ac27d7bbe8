use super::*;

/// Zotero item types produced by the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
  /// `book`
  Book,
  /// `thesis`
  Thesis,
  /// `webpage`
  Webpage,
  /// `computerProgram`, used for software
  ComputerProgram,
  /// `journalArticle`
  JournalArticle,
  /// `newspaperArticle`, also used for magazine articles
  NewspaperArticle,
  /// `conferencePaper`
  ConferencePaper,
  /// `report`
  Report,
  /// Child note holding a publication's note or review
  Note,
}

impl ItemType {
  /// Every item type, notes included.
  pub const ALL: [ItemType; 9] = [
    ItemType::Book,
    ItemType::Thesis,
    ItemType::Webpage,
    ItemType::ComputerProgram,
    ItemType::JournalArticle,
    ItemType::NewspaperArticle,
    ItemType::ConferencePaper,
    ItemType::Report,
    ItemType::Note,
  ];

  /// The Zotero API name of the type.
  pub fn as_str(self) -> &'static str {
    match self {
      ItemType::Book => "book",
      ItemType::Thesis => "thesis",
      ItemType::Webpage => "webpage",
      ItemType::ComputerProgram => "computerProgram",
      ItemType::JournalArticle => "journalArticle",
      ItemType::NewspaperArticle => "newspaperArticle",
      ItemType::ConferencePaper => "conferencePaper",
      ItemType::Report => "report",
      ItemType::Note => "note",
    }
  }

  /// The item type a Papers2 publication type is uploaded as.
  pub fn for_pub_type(pub_type: PubType) -> Self {
    match pub_type {
      PubType::Book | PubType::EBook => ItemType::Book,
      PubType::Thesis => ItemType::Thesis,
      PubType::Website | PubType::WebsiteArticle => ItemType::Webpage,
      PubType::Software => ItemType::ComputerProgram,
      PubType::JournalArticle | PubType::Preprint => ItemType::JournalArticle,
      PubType::NewspaperArticle => ItemType::NewspaperArticle,
      PubType::ConferencePaper => ItemType::ConferencePaper,
      PubType::Report | PubType::Protocol => ItemType::Report,
    }
  }

  /// Resolves the item type of a publication from its subtype code.
  pub fn for_publication(publication: &Publication) -> Result<Self> {
    publication
      .pub_type()
      .map(Self::for_pub_type)
      .ok_or(MigrateError::UnmappedPublicationType(publication.subtype))
  }

  /// Fields the migration fills in for this item type.
  ///
  /// Every name here is a valid field of the type in the Zotero schema, so the list doubles as
  /// the key set of the offline template.
  pub fn fields(self) -> &'static [&'static str] {
    match self {
      ItemType::Book => &[
        "title",
        "creators",
        "abstractNote",
        "volume",
        "edition",
        "place",
        "publisher",
        "date",
        "numPages",
        "language",
        "ISBN",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::Thesis => &[
        "title",
        "creators",
        "abstractNote",
        "place",
        "date",
        "numPages",
        "language",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::Webpage => &[
        "title",
        "creators",
        "abstractNote",
        "date",
        "url",
        "accessDate",
        "language",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::ComputerProgram => &[
        "title",
        "creators",
        "abstractNote",
        "date",
        "place",
        "ISBN",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::JournalArticle => &[
        "title",
        "creators",
        "abstractNote",
        "publicationTitle",
        "volume",
        "issue",
        "pages",
        "date",
        "journalAbbreviation",
        "language",
        "DOI",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::NewspaperArticle => &[
        "title",
        "creators",
        "abstractNote",
        "publicationTitle",
        "place",
        "edition",
        "date",
        "pages",
        "language",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::ConferencePaper => &[
        "title",
        "creators",
        "abstractNote",
        "date",
        "place",
        "publisher",
        "volume",
        "pages",
        "language",
        "DOI",
        "ISBN",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::Report => &[
        "title",
        "creators",
        "abstractNote",
        "reportNumber",
        "place",
        "date",
        "pages",
        "language",
        "url",
        "accessDate",
        "rights",
        "extra",
        "tags",
        "collections",
      ],
      ItemType::Note => &["note", "tags", "collections"],
    }
  }

  /// A template equivalent to the one the Zotero API serves, built without a network call.
  pub fn local_template(self) -> Item {
    let mut item = Item::new();
    item.insert("itemType".into(), Value::String(self.as_str().into()));
    for field in self.fields() {
      let default = match *field {
        "creators" | "tags" | "collections" => Value::Array(Vec::new()),
        _ => Value::String(String::new()),
      };
      item.insert((*field).into(), default);
    }
    item.insert("relations".into(), Value::Object(Map::new()));
    item
  }
}

impl FromStr for ItemType {
  type Err = MigrateError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| MigrateError::InvalidBatch(format!("unknown item type \"{s}\"")))
  }
}

impl Display for ItemType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_pub_type_maps() {
    assert_eq!(ItemType::for_pub_type(PubType::Preprint), ItemType::JournalArticle);
    assert_eq!(ItemType::for_pub_type(PubType::Protocol), ItemType::Report);
    assert_eq!(ItemType::for_pub_type(PubType::EBook), ItemType::Book);
    assert_eq!(ItemType::for_pub_type(PubType::WebsiteArticle), ItemType::Webpage);
  }

  #[test]
  fn test_unmapped_subtype() {
    let publication = Publication { id: 7, subtype: -1000, ..Default::default() };
    assert!(matches!(
      ItemType::for_publication(&publication),
      Err(MigrateError::UnmappedPublicationType(-1000))
    ));
  }

  #[test]
  fn test_local_template() {
    let template = ItemType::JournalArticle.local_template();
    assert_eq!(template["itemType"], "journalArticle");
    assert_eq!(template["title"], "");
    assert_eq!(template["creators"], json!([]));
    assert_eq!(template["relations"], json!({}));
    assert!(!template.contains_key("ISBN"));

    let note = ItemType::Note.local_template();
    assert_eq!(note.len(), 5);
  }

  #[test]
  fn test_item_type_from_str() {
    for item_type in ItemType::ALL {
      assert_eq!(item_type.as_str().parse::<ItemType>().unwrap(), item_type);
    }
    assert!("manuscript".parse::<ItemType>().is_err());
  }
}
