//! Import settings.
//!
//! [`ImportConfig`] gathers everything a run needs. It starts from defaults, can be loaded from a
//! TOML file, and is then adjusted by the caller (the command line tool applies its flags on top).
//!
//! ```toml
//! batch_size      = 25
//! checkpoint_file = "papers2zotero.json"
//!
//! [papers2]
//! folder        = "/Users/me/Documents/Papers2"
//! keyword_types = ["user", "label"]
//! collections   = ["Thesis", "Teaching"]
//! attachments   = "unread"
//!
//! [papers2.labels]
//! Red = "urgent"
//!
//! [zotero]
//! library_id   = "12345"
//! library_type = "user"
//! api_key      = "..."
//! ```

use super::*;

/// Largest batch accepted, the Zotero per-request item limit.
pub const MAX_BATCH_SIZE: usize = MAX_WRITE_ITEMS;

/// Default checkpoint file name, relative to the working directory.
pub const DEFAULT_CHECKPOINT_FILE: &str = "papers2zotero.json";

/// Default prefix of label tags, giving e.g. `LabelRed`.
pub const DEFAULT_LABEL_PREFIX: &str = "Label";

/// Vocabularies that become Zotero tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordSource {
  /// Keywords the user assigned
  User,
  /// Keywords Papers2 extracted automatically
  Auto,
  /// The color label
  Label,
}

impl FromStr for KeywordSource {
  type Err = MigrateError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "user" => Ok(KeywordSource::User),
      "auto" => Ok(KeywordSource::Auto),
      "label" => Ok(KeywordSource::Label),
      other => Err(MigrateError::Config(format!(
        "Unknown keyword type \"{other}\", expected user, auto or label"
      ))),
    }
  }
}

/// Which attached files are uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentPolicy {
  /// Every file
  #[default]
  All,
  /// Only files of publications never opened
  Unread,
  /// No files
  None,
}

impl FromStr for AttachmentPolicy {
  type Err = MigrateError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "all" => Ok(AttachmentPolicy::All),
      "unread" => Ok(AttachmentPolicy::Unread),
      "none" => Ok(AttachmentPolicy::None),
      other => Err(MigrateError::Config(format!(
        "Unknown attachment policy \"{other}\", expected all, unread or none"
      ))),
    }
  }
}

/// Which Papers2 collections are recreated in Zotero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "CollectionsValue", into = "CollectionsValue")]
pub enum CollectionSelection {
  /// Every user collection of the library
  #[default]
  All,
  /// Only collections with these names
  Named(Vec<String>),
  /// No collections are created and items are not filed
  None,
}

/// TOML shape of [`CollectionSelection`]: `"all"`, `"none"` or a list of names.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CollectionsValue {
  Keyword(String),
  Names(Vec<String>),
}

impl TryFrom<CollectionsValue> for CollectionSelection {
  type Error = MigrateError;

  fn try_from(value: CollectionsValue) -> Result<Self> {
    match value {
      CollectionsValue::Keyword(keyword) => keyword.parse(),
      CollectionsValue::Names(names) => Ok(CollectionSelection::Named(names)),
    }
  }
}

impl From<CollectionSelection> for CollectionsValue {
  fn from(selection: CollectionSelection) -> Self {
    match selection {
      CollectionSelection::All => CollectionsValue::Keyword("all".into()),
      CollectionSelection::None => CollectionsValue::Keyword("none".into()),
      CollectionSelection::Named(names) => CollectionsValue::Names(names),
    }
  }
}

impl FromStr for CollectionSelection {
  type Err = MigrateError;

  /// `all`, `none`, or a comma separated list of names.
  fn from_str(s: &str) -> Result<Self> {
    match s.trim() {
      "all" => Ok(CollectionSelection::All),
      "none" | "" => Ok(CollectionSelection::None),
      names => Ok(CollectionSelection::Named(
        names.split(',').map(str::trim).filter(|n| !n.is_empty()).map(str::to_string).collect(),
      )),
    }
  }
}

/// Where a dry run writes its items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DryRunTarget {
  /// Standard output, selected with `stdout` or `-`
  #[default]
  Stdout,
  /// A file, created or truncated
  File(PathBuf),
}

impl FromStr for DryRunTarget {
  type Err = MigrateError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim() {
      "" => Err(MigrateError::Config("Dry run output must not be empty".into())),
      "stdout" | "-" => Ok(DryRunTarget::Stdout),
      path => Ok(DryRunTarget::File(PathBuf::from(path))),
    }
  }
}

/// Settings of one import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
  /// Papers2 library folder
  pub papers2_folder:  PathBuf,
  /// Zotero library id, required unless dry running
  pub library_id:      Option<String>,
  /// Personal or group library
  pub library_type:    LibraryType,
  /// Zotero API key with write access, required unless dry running
  pub api_key:         Option<String>,
  /// Tag vocabularies, applied in the order user, auto, label
  pub keyword_sources: Vec<KeywordSource>,
  /// Label name to tag overrides; an empty tag disables the label
  pub label_overrides: BTreeMap<String, String>,
  /// Prefix of label tags without an override
  pub label_prefix:    String,
  /// Collections to recreate
  pub collections:     CollectionSelection,
  /// Items per upload request
  pub batch_size:      usize,
  /// Where imported publication ids are recorded
  pub checkpoint_file: PathBuf,
  /// Which files to upload
  pub attachments:     AttachmentPolicy,
  /// Write items as JSON instead of uploading them
  pub dry_run:         bool,
  /// Where a dry run writes
  pub dry_run_output:  DryRunTarget,
  /// Only import these publication types
  pub pub_types:       Option<Vec<PubType>>,
  /// Only import these publication ids
  pub ids:             Option<Vec<i64>>,
}

impl Default for ImportConfig {
  fn default() -> Self {
    Self {
      papers2_folder:  Papers2::default_folder(),
      library_id:      None,
      library_type:    LibraryType::User,
      api_key:         None,
      keyword_sources: vec![KeywordSource::User, KeywordSource::Label],
      label_overrides: BTreeMap::new(),
      label_prefix:    DEFAULT_LABEL_PREFIX.to_string(),
      collections:     CollectionSelection::All,
      batch_size:      MAX_BATCH_SIZE,
      checkpoint_file: PathBuf::from(DEFAULT_CHECKPOINT_FILE),
      attachments:     AttachmentPolicy::All,
      dry_run:         false,
      dry_run_output:  DryRunTarget::Stdout,
      pub_types:       None,
      ids:             None,
    }
  }
}

/// On-disk layout of a configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  batch_size:      Option<usize>,
  checkpoint_file: Option<PathBuf>,
  dry_run:         Option<bool>,
  dry_run_output:  Option<String>,
  #[serde(default)]
  papers2:         Papers2Section,
  #[serde(default)]
  zotero:          ZoteroSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Papers2Section {
  folder:        Option<PathBuf>,
  keyword_types: Option<Vec<KeywordSource>>,
  labels:        Option<BTreeMap<String, String>>,
  label_prefix:  Option<String>,
  collections:   Option<CollectionSelection>,
  attachments:   Option<AttachmentPolicy>,
  types:         Option<Vec<String>>,
  ids:           Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ZoteroSection {
  library_id:   Option<String>,
  library_type: Option<LibraryType>,
  api_key:      Option<String>,
}

impl ImportConfig {
  /// Loads a configuration file on top of the defaults.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    Self::from_toml(&content)
  }

  /// Parses TOML configuration on top of the defaults.
  pub fn from_toml(content: &str) -> Result<Self> {
    let file: ConfigFile = toml::from_str(content)?;
    let mut config = Self::default();

    if let Some(batch_size) = file.batch_size {
      config.batch_size = batch_size;
    }
    if let Some(checkpoint_file) = file.checkpoint_file {
      config.checkpoint_file = checkpoint_file;
    }
    if let Some(dry_run) = file.dry_run {
      config.dry_run = dry_run;
    }
    if let Some(output) = file.dry_run_output {
      config.dry_run_output = output.parse()?;
    }

    let papers2 = file.papers2;
    if let Some(folder) = papers2.folder {
      config.papers2_folder = folder;
    }
    if let Some(keyword_types) = papers2.keyword_types {
      config.keyword_sources = keyword_types;
    }
    if let Some(labels) = papers2.labels {
      config.label_overrides = labels;
    }
    if let Some(prefix) = papers2.label_prefix {
      config.label_prefix = prefix;
    }
    if let Some(collections) = papers2.collections {
      config.collections = collections;
    }
    if let Some(attachments) = papers2.attachments {
      config.attachments = attachments;
    }
    if let Some(types) = papers2.types {
      config.pub_types = Some(types.iter().map(|t| t.parse()).collect::<Result<_>>()?);
    }
    if let Some(ids) = papers2.ids {
      config.ids = Some(ids);
    }

    let zotero = file.zotero;
    config.library_id = zotero.library_id.or(config.library_id);
    config.library_type = zotero.library_type.unwrap_or(config.library_type);
    config.api_key = zotero.api_key.or(config.api_key);

    Ok(config)
  }

  /// Checks the settings are usable for a run.
  pub fn validate(&self) -> Result<()> {
    if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
      return Err(MigrateError::Config(format!(
        "Batch size must be between 1 and {MAX_BATCH_SIZE}, got {}",
        self.batch_size
      )));
    }
    if !self.dry_run {
      let missing = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());
      if missing(&self.library_id) {
        return Err(MigrateError::Config("A Zotero library id is required".into()));
      }
      if missing(&self.api_key) {
        return Err(MigrateError::Config("A Zotero API key is required".into()));
      }
    }
    self.label_map().map(|_| ())
  }

  /// Tag name of every label.
  ///
  /// Labels without an override get `<prefix><Name>`. The `None` label and labels overridden with
  /// an empty tag are left out, so they never produce a tag.
  pub fn label_map(&self) -> Result<BTreeMap<Label, String>> {
    for name in self.label_overrides.keys() {
      if !Label::ALL.iter().any(|label| label.name().eq_ignore_ascii_case(name)) {
        return Err(MigrateError::Config(format!("Unknown label \"{name}\" in label overrides")));
      }
    }

    let mut map = BTreeMap::new();
    for label in Label::ALL.into_iter().filter(|label| *label != Label::None) {
      let tag = self
        .label_overrides
        .iter()
        .find(|(name, _)| label.name().eq_ignore_ascii_case(name))
        .map(|(_, tag)| tag.clone())
        .unwrap_or_else(|| format!("{}{}", self.label_prefix, label.name()));
      if !tag.is_empty() {
        map.insert(label, tag);
      }
    }
    Ok(map)
  }

  /// The publication filter selected by these settings.
  pub fn publication_filter(&self) -> PublicationFilter {
    PublicationFilter { types: self.pub_types.clone(), ids: self.ids.clone(), ..Default::default() }
  }
}
