//! Fixed vocabulary of the Papers2 database: publication types, identifier namespaces, keyword
//! kinds and color labels.

use super::*;

/// Publication kinds known to Papers2, keyed by their `Publication.subtype` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubType {
  /// Printed book
  Book,
  /// Thesis or dissertation
  Thesis,
  /// Electronic book
  EBook,
  /// Web site
  Website,
  /// Software package
  Software,
  /// Journal article
  JournalArticle,
  /// Newspaper article
  NewspaperArticle,
  /// Article published on a web site
  WebsiteArticle,
  /// Preprint
  Preprint,
  /// Conference paper
  ConferencePaper,
  /// Technical report
  Report,
  /// Lab protocol
  Protocol,
}

impl PubType {
  /// Every known publication type.
  pub const ALL: [PubType; 12] = [
    PubType::Book,
    PubType::Thesis,
    PubType::EBook,
    PubType::Website,
    PubType::Software,
    PubType::JournalArticle,
    PubType::NewspaperArticle,
    PubType::WebsiteArticle,
    PubType::Preprint,
    PubType::ConferencePaper,
    PubType::Report,
    PubType::Protocol,
  ];

  /// The `Publication.subtype` code Papers2 stores for this type.
  pub fn code(self) -> i64 {
    match self {
      PubType::Book => 0,
      PubType::Thesis => 10,
      PubType::EBook => 20,
      PubType::Website => 300,
      PubType::Software => 341,
      PubType::JournalArticle => 400,
      PubType::NewspaperArticle => 402,
      PubType::WebsiteArticle => 403,
      PubType::Preprint => 415,
      PubType::ConferencePaper => 420,
      PubType::Report => 700,
      PubType::Protocol => 717,
    }
  }

  /// Looks up a publication type from its subtype code.
  pub fn from_code(code: i64) -> Option<Self> { Self::ALL.into_iter().find(|t| t.code() == code) }

  /// Human readable name, as shown in Papers2.
  pub fn name(self) -> &'static str {
    match self {
      PubType::Book => "Book",
      PubType::Thesis => "Thesis",
      PubType::EBook => "eBook",
      PubType::Website => "Website",
      PubType::Software => "Software",
      PubType::JournalArticle => "Journal Article",
      PubType::NewspaperArticle => "Newspaper Article",
      PubType::WebsiteArticle => "Website Article",
      PubType::Preprint => "Preprint",
      PubType::ConferencePaper => "Conference Paper",
      PubType::Report => "Report",
      PubType::Protocol => "Protocol",
    }
  }
}

impl FromStr for PubType {
  type Err = MigrateError;

  /// Accepts either the display name ("Journal Article") or the snake case form
  /// ("journal_article"), case-insensitively.
  fn from_str(s: &str) -> Result<Self> {
    let wanted = s.trim().to_ascii_lowercase().replace(|c: char| c == '_' || c == ' ', "");
    Self::ALL
      .into_iter()
      .find(|t| t.name().to_ascii_lowercase().replace(' ', "") == wanted)
      .ok_or_else(|| MigrateError::Config(format!("Unknown publication type \"{s}\"")))
  }
}

impl Display for PubType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

/// Namespaces of identifiers stored as sync events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
  /// PubMed
  Pubmed,
  /// PubMed Central
  Pmc,
  /// International Standard Book Number
  Isbn,
  /// International Standard Serial Number
  Issn,
  /// Identifiers entered by the user
  User,
}

impl IdSource {
  /// The `SyncEvent.source_id` value for this namespace.
  pub fn source_id(self) -> &'static str {
    match self {
      IdSource::Pubmed => "gov.nih.nlm.ncbi.pubmed",
      IdSource::Pmc => "gov.nih.nlm.ncbi.pmc",
      IdSource::Isbn => "org.iso.isbn",
      IdSource::Issn => "org.iso.issn",
      IdSource::User => "com.mekentosj.papers2.user",
    }
  }
}

/// Vocabularies a keyword can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordType {
  /// Keywords extracted automatically (e.g. MeSH terms)
  Auto,
  /// Keywords assigned by the user
  User,
}

impl KeywordType {
  /// The `KeywordItem.type` code.
  pub fn code(self) -> i64 {
    match self {
      KeywordType::Auto => 0,
      KeywordType::User => 99,
    }
  }
}

/// Color labels a publication can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
  /// No label
  None,
  /// Red
  Red,
  /// Orange
  Orange,
  /// Yellow
  Yellow,
  /// Green
  Green,
  /// Blue
  Blue,
  /// Purple
  Purple,
  /// Gray
  Gray,
}

impl Label {
  /// Every label, in code order.
  pub const ALL: [Label; 8] = [
    Label::None,
    Label::Red,
    Label::Orange,
    Label::Yellow,
    Label::Green,
    Label::Blue,
    Label::Purple,
    Label::Gray,
  ];

  /// Looks up a label from the `Publication.label` code.
  pub fn from_code(code: i64) -> Result<Self> {
    usize::try_from(code)
      .ok()
      .and_then(|idx| Self::ALL.get(idx).copied())
      .ok_or(MigrateError::UnknownLabel(code))
  }

  /// Name of the label, e.g. "Red".
  pub fn name(self) -> &'static str {
    match self {
      Label::None => "None",
      Label::Red => "Red",
      Label::Orange => "Orange",
      Label::Yellow => "Yellow",
      Label::Green => "Green",
      Label::Blue => "Blue",
      Label::Purple => "Purple",
      Label::Gray => "Gray",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pub_type_codes_roundtrip() {
    for pub_type in PubType::ALL {
      assert_eq!(PubType::from_code(pub_type.code()), Some(pub_type));
    }
    assert_eq!(PubType::from_code(-1000), None);
  }

  #[test]
  fn test_pub_type_from_str() {
    assert_eq!("journal_article".parse::<PubType>().unwrap(), PubType::JournalArticle);
    assert_eq!("Conference Paper".parse::<PubType>().unwrap(), PubType::ConferencePaper);
    assert_eq!("ebook".parse::<PubType>().unwrap(), PubType::EBook);
    assert!("pamphlet".parse::<PubType>().is_err());
  }

  #[test]
  fn test_label_from_code() {
    assert_eq!(Label::from_code(0).unwrap(), Label::None);
    assert_eq!(Label::from_code(5).unwrap(), Label::Blue);
    assert!(matches!(Label::from_code(8), Err(MigrateError::UnknownLabel(8))));
    assert!(matches!(Label::from_code(-1), Err(MigrateError::UnknownLabel(-1))));
  }
}
