use super::*;

/// A single publication row from the Papers2 database.
///
/// Only the columns the migration reads are kept. Text columns that Papers2 leaves `NULL` are
/// `None`; empty strings are preserved as they are and filtered out during extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Publication {
  /// `ROWID` of the publication; the id tracked by the checkpoint
  pub id:               i64,
  /// UUID linking the publication to its sync events (identifiers and URLs)
  pub uuid:             Option<String>,
  /// Publication type code, see [`PubType`]
  pub subtype:          i64,
  /// Packed publication date, e.g. `99200806151200000000222000`
  pub publication_date: Option<String>,
  /// Author list as a single display string
  pub author_string:    Option<String>,
  /// Title of the publication
  pub title:            Option<String>,
  /// Abstract
  pub summary:          Option<String>,
  /// Journal (or other container) name
  pub bundle_string:    Option<String>,
  /// Journal abbreviation
  pub abbreviation:     Option<String>,
  /// Volume
  pub volume:           Option<String>,
  /// Issue
  pub number:           Option<String>,
  /// First page
  pub startpage:        Option<String>,
  /// Last page
  pub endpage:          Option<String>,
  /// DOI without a resolver prefix
  pub doi:              Option<String>,
  /// Edition or software version
  pub version:          Option<String>,
  /// Language
  pub language:         Option<String>,
  /// Report or patent number
  pub document_number:  Option<String>,
  /// Place of publication
  pub place:            Option<String>,
  /// Publisher
  pub publisher:        Option<String>,
  /// Rights statement
  pub copyright:        Option<String>,
  /// Free text note attached to the publication
  pub notes:            Option<String>,
  /// Unix timestamp of when the publication entered the library
  pub imported_date:    Option<f64>,
  /// Color label code, see [`Label`]
  pub label:            i64,
  /// Number of times the publication has been opened
  pub times_read:       i64,
  /// In the Papers2 trash
  pub marked_deleted:   bool,
  /// Flagged by Papers2 as a duplicate of another publication
  pub marked_duplicate: bool,
}

impl Publication {
  /// The publication type, if the subtype code is one Papers2 defines.
  pub fn pub_type(&self) -> Option<PubType> { PubType::from_code(self.subtype) }

  /// The color label of this publication.
  pub fn label(&self) -> Result<Label> { Label::from_code(self.label) }

  /// A short description for log messages.
  pub fn describe(&self) -> String {
    match &self.title {
      Some(title) if !title.is_empty() => format!("#{} \"{}\"", self.id, title),
      _ => format!("#{}", self.id),
    }
  }
}

/// An author of a publication, as stored in the ordered author list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
  /// Given names
  pub prename:       Option<String>,
  /// Family name, or the full name of an institution
  pub surname:       Option<String>,
  /// Greater than zero for institutions, which only carry a surname
  pub institutional: i64,
  /// Role of the author: 0 for author, 1 for editor
  pub kind:          i64,
}

/// A user collection in Papers2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
  /// `ROWID` of the collection
  pub id:   i64,
  /// Display name, matched against Zotero collection names
  pub name: String,
}

/// A review the user wrote for a publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  /// Review text
  pub content: String,
  /// Rating given with the review
  pub rating:  i64,
}

/// A file attached to a publication, with its path resolved against the Papers2 folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
  /// Absolute path of the file
  pub path:         PathBuf,
  /// MIME type recorded by Papers2
  #[serde(rename = "contentType")]
  pub content_type: String,
}
