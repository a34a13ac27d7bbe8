//! The field rule table and the formatters it uses.

use super::*;

/// Where a rule reads its raw values from.
#[derive(Clone, Copy)]
pub enum Source {
  /// Text columns of the publication, in preference order
  Columns(fn(&Publication) -> Vec<Option<String>>),
  /// A unix timestamp column
  Seconds(fn(&Publication) -> Option<f64>),
  /// Identifiers from these namespaces, concatenated
  Identifiers(&'static [IdSource]),
  /// URLs, most recently updated first
  Urls,
  /// Ordered authors
  Authors,
  /// Enabled keyword vocabularies followed by the label tag
  Keywords,
  /// Keys of the allowed collections the publication belongs to
  Collections,
}

/// How many values a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
  /// A scalar: the first non-empty value
  One,
  /// Exactly this many values joined with `-`, or nothing
  Range(usize),
  /// A list of any length
  Many,
}

impl Arity {
  fn limit(self) -> usize {
    match self {
      Arity::One => 1,
      Arity::Range(n) => n,
      Arity::Many => usize::MAX,
    }
  }
}

/// How each surviving raw value is turned into JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  /// The text unchanged
  Verbatim,
  /// Papers2 packed date to `YYYY[-MM[-DD]]`
  PackedDate,
  /// Unix seconds to `YYYY-MM-DD HH:MM:SS` in UTC
  Timestamp,
  /// `PMID: <id>`
  PubmedId,
  /// Zotero creator object
  Creator,
  /// Zotero tag object
  Tag,
}

/// A raw value produced by a [`Source`].
#[derive(Debug, Clone)]
pub enum Raw {
  /// A text column or an identifier
  Text(String),
  /// A Unix timestamp
  Seconds(f64),
  /// One entry of the ordered author list
  Author(Author),
}

impl Raw {
  fn is_empty(&self) -> bool {
    match self {
      Raw::Text(text) => text.trim().is_empty(),
      Raw::Seconds(_) | Raw::Author(_) => false,
    }
  }
}

/// One row of the registry: a destination field and how to fill it.
#[derive(Clone, Copy)]
pub struct FieldRule {
  /// Zotero field name
  pub field:  &'static str,
  /// Where the raw values come from
  pub source: Source,
  /// How many values the field takes
  pub arity:  Arity,
  /// Conversion applied to each value
  pub format: Format,
}

const fn rule(field: &'static str, source: Source, arity: Arity, format: Format) -> FieldRule {
  FieldRule { field, source, arity, format }
}

lazy_static! {
  /// Every field the migration knows how to fill, sorted by field name.
  ///
  /// `publicationTitle` reads the bundle name first and falls back to the abbreviation. Older
  /// importers took the abbreviation first and then the bundle name; the abbreviation is kept in
  /// `journalAbbreviation` instead.
  pub static ref FIELD_RULES: Vec<FieldRule> = vec![
    rule("DOI", Source::Columns(|p| vec![p.doi.clone()]), Arity::One, Format::Verbatim),
    rule("ISBN", Source::Identifiers(&[IdSource::Isbn, IdSource::Issn]), Arity::One, Format::Verbatim),
    rule("abstractNote", Source::Columns(|p| vec![p.summary.clone()]), Arity::One, Format::Verbatim),
    rule("accessDate", Source::Seconds(|p| p.imported_date), Arity::One, Format::Timestamp),
    rule("collections", Source::Collections, Arity::Many, Format::Verbatim),
    rule("creators", Source::Authors, Arity::Many, Format::Creator),
    rule("date", Source::Columns(|p| vec![p.publication_date.clone()]), Arity::One, Format::PackedDate),
    rule("edition", Source::Columns(|p| vec![p.version.clone()]), Arity::One, Format::Verbatim),
    rule("extra", Source::Identifiers(&[IdSource::Pubmed, IdSource::Pmc]), Arity::One, Format::PubmedId),
    rule("issue", Source::Columns(|p| vec![p.number.clone()]), Arity::One, Format::Verbatim),
    rule("journalAbbreviation", Source::Columns(|p| vec![p.abbreviation.clone()]), Arity::One, Format::Verbatim),
    rule("language", Source::Columns(|p| vec![p.language.clone()]), Arity::One, Format::Verbatim),
    rule("numPages", Source::Columns(|p| vec![p.startpage.clone()]), Arity::One, Format::Verbatim),
    rule(
      "pages",
      Source::Columns(|p| vec![p.startpage.clone(), p.endpage.clone()]),
      Arity::Range(2),
      Format::Verbatim,
    ),
    rule("place", Source::Columns(|p| vec![p.place.clone()]), Arity::One, Format::Verbatim),
    rule(
      "publicationTitle",
      Source::Columns(|p| vec![p.bundle_string.clone(), p.abbreviation.clone()]),
      Arity::One,
      Format::Verbatim,
    ),
    rule("publisher", Source::Columns(|p| vec![p.publisher.clone()]), Arity::One, Format::Verbatim),
    rule("reportNumber", Source::Columns(|p| vec![p.document_number.clone()]), Arity::One, Format::Verbatim),
    rule("rights", Source::Columns(|p| vec![p.copyright.clone()]), Arity::One, Format::Verbatim),
    rule("tags", Source::Keywords, Arity::Many, Format::Tag),
    rule("title", Source::Columns(|p| vec![p.title.clone()]), Arity::One, Format::Verbatim),
    rule("url", Source::Urls, Arity::One, Format::Verbatim),
    rule("volume", Source::Columns(|p| vec![p.volume.clone()]), Arity::One, Format::Verbatim),
  ];

  static ref DIGITS: Regex = Regex::new("^[0-9]+$").expect("static pattern is valid");
}

/// The rule for a destination field, if the migration fills it.
pub fn rule_for(field: &str) -> Option<&'static FieldRule> {
  FIELD_RULES.iter().find(|rule| rule.field == field)
}

impl Source {
  /// Reads the raw values for `publication`.
  pub fn fetch(&self, publication: &Publication, ctx: &ExtractionContext<'_>) -> Result<Vec<Raw>> {
    let texts = |values: Vec<String>| -> Vec<Raw> { values.into_iter().map(Raw::Text).collect() };
    Ok(match self {
      Source::Columns(columns) => columns(publication).into_iter().flatten().map(Raw::Text).collect(),
      Source::Seconds(column) => column(publication).into_iter().map(Raw::Seconds).collect(),
      Source::Identifiers(sources) => {
        let mut identifiers = Vec::new();
        for source in *sources {
          identifiers.extend(ctx.library.identifiers(publication, *source)?);
        }
        texts(identifiers)
      },
      Source::Urls => texts(ctx.library.urls(publication)?),
      Source::Authors => ctx.library.authors(publication)?.into_iter().map(Raw::Author).collect(),
      Source::Keywords => texts(ctx.keywords(publication)?),
      Source::Collections => texts(ctx.collection_keys(publication)?),
    })
  }
}

impl Format {
  /// Formats one raw value; `None` when the value carries nothing usable.
  pub fn apply(self, raw: Raw) -> Result<Option<Value>> {
    let value = match (self, raw) {
      (Format::Creator, Raw::Author(author)) => Some(creator(&author)?),
      (Format::Timestamp, Raw::Seconds(seconds)) => timestamp(seconds).map(Value::String),
      (Format::PackedDate, Raw::Text(text)) => packed_date(&text).map(Value::String),
      (Format::PubmedId, Raw::Text(text)) => Some(Value::String(format!("PMID: {}", text.trim()))),
      (Format::Tag, Raw::Text(text)) => Some(json!({ "tag": text })),
      (Format::Verbatim, Raw::Text(text)) => Some(Value::String(text)),
      (Format::Verbatim, Raw::Seconds(seconds)) => Some(json!(seconds)),
      (format, raw) => {
        warn!(?format, ?raw, "Raw value does not fit its format");
        None
      },
    };
    Ok(value)
  }
}

impl FieldRule {
  /// Runs the rule against a publication.
  ///
  /// Returns `None` when the field should keep its template default: no usable value for a
  /// scalar, too few values for a range, or an empty list.
  pub fn extract(
    &self,
    publication: &Publication,
    ctx: &ExtractionContext<'_>,
  ) -> Result<Option<Value>> {
    let raw: Vec<Raw> = self
      .source
      .fetch(publication, ctx)?
      .into_iter()
      .filter(|raw| !raw.is_empty())
      .take(self.arity.limit())
      .collect();

    match self.arity {
      Arity::One => match raw.into_iter().next() {
        Some(raw) => self.format.apply(raw),
        None => Ok(None),
      },
      Arity::Range(n) => {
        if raw.len() < n {
          return Ok(None);
        }
        let mut parts = Vec::with_capacity(n);
        for raw in raw {
          match self.format.apply(raw)? {
            Some(Value::String(part)) => parts.push(part),
            _ => return Ok(None),
          }
        }
        Ok(Some(Value::String(parts.join("-"))))
      },
      Arity::Many => {
        let mut values = Vec::with_capacity(raw.len());
        for raw in raw {
          values.extend(self.format.apply(raw)?);
        }
        Ok(if values.is_empty() { None } else { Some(Value::Array(values)) })
      },
    }
  }
}

/// Formats a Papers2 packed date such as `99200806151200000000222000`.
///
/// The year sits at characters 2..6, the month at 6..8 and the day at 8..10. Trailing components
/// that are missing or not numeric are dropped; a month or day of `00` becomes `01`.
pub fn packed_date(packed: &str) -> Option<String> {
  let component = |range: std::ops::Range<usize>| {
    packed.get(range).filter(|part| DIGITS.is_match(part)).map(|part| {
      if part.chars().all(|c| c == '0') && part.len() == 2 {
        "01".to_string()
      } else {
        part.to_string()
      }
    })
  };

  let year = component(2..6)?;
  let mut date = year;
  if let Some(month) = component(6..8) {
    date.push('-');
    date.push_str(&month);
    if let Some(day) = component(8..10) {
      date.push('-');
      date.push_str(&day);
    }
  }
  Some(date)
}

/// Formats unix seconds as `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn timestamp(seconds: f64) -> Option<String> {
  if !seconds.is_finite() {
    return None;
  }
  DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0)
    .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Converts an ordered author into a Zotero creator.
fn creator(author: &Author) -> Result<Value> {
  let creator_type = match author.kind {
    0 => "author",
    1 => "editor",
    other => return Err(MigrateError::UnsupportedAuthorType(other)),
  };
  let surname = author.surname.clone().unwrap_or_default();

  Ok(if author.institutional > 0 {
    json!({ "creatorType": creator_type, "name": surname })
  } else {
    json!({
      "creatorType": creator_type,
      "firstName": author.prename.clone().unwrap_or_default(),
      "lastName": surname,
    })
  })
}
