use std::{
  cell::RefCell,
  time::{Duration, UNIX_EPOCH},
};

use md5::{Digest, Md5};
use reqwest::{
  blocking::{Client, RequestBuilder, Response},
  header::CONTENT_TYPE,
};
use url::Url;

use super::*;

/// Base URL of the public Zotero Web API.
pub const DEFAULT_BASE_URL: &str = "https://api.zotero.org";

const API_VERSION: &str = "3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Page size used when listing collections, the API maximum.
const COLLECTIONS_PAGE_SIZE: usize = 100;

/// Client for the Zotero Web API v3.
///
/// Every request carries the API key and version headers. Item templates are fetched once per
/// item type and cached for the lifetime of the client.
pub struct ZoteroClient {
  http:      Client,
  root:      Url,
  library:   Url,
  api_key:   String,
  templates: RefCell<HashMap<ItemType, Item>>,
}

/// One entry of a collection listing. Only the `data` object is of interest.
#[derive(Deserialize)]
struct CollectionEntry {
  data: RemoteCollection,
}

/// An item as returned by `GET /items/<key>`.
#[derive(Deserialize)]
struct ItemEntry {
  version: u64,
  data:    ItemData,
}

#[derive(Deserialize)]
struct ItemData {
  #[serde(default)]
  collections: Vec<String>,
}

/// Answer to an upload authorization request.
#[derive(Deserialize)]
#[serde(untagged)]
enum UploadAuthorization {
  /// The server already holds a file with this md5
  Exists {
    #[allow(dead_code)]
    exists: u8,
  },
  /// Where and how to send the bytes
  Upload {
    url:          String,
    #[serde(rename = "contentType")]
    content_type: String,
    prefix:       String,
    suffix:       String,
    #[serde(rename = "uploadKey")]
    upload_key:   String,
  },
}

/// A local file read for upload.
struct LocalFile {
  filename: String,
  content:  Vec<u8>,
  md5:      String,
  /// Modification time in milliseconds since the epoch
  mtime:    u128,
}

impl LocalFile {
  fn read(path: &Path) -> Result<Self> {
    let content = std::fs::read(path)?;
    let mtime = std::fs::metadata(path)?
      .modified()?
      .duration_since(UNIX_EPOCH)
      .map(|elapsed| elapsed.as_millis())
      .unwrap_or_default();
    Ok(Self {
      filename: file_name(path),
      md5: format!("{:x}", Md5::digest(&content)),
      content,
      mtime,
    })
  }
}

impl ZoteroClient {
  /// Creates a client for a library on `api.zotero.org`.
  pub fn new(library_id: &str, library_type: LibraryType, api_key: &str) -> Result<Self> {
    Self::with_base_url(DEFAULT_BASE_URL, library_id, library_type, api_key)
  }

  /// Creates a client for a library on a Zotero compatible server at `base_url`.
  pub fn with_base_url(
    base_url: &str,
    library_id: &str,
    library_type: LibraryType,
    api_key: &str,
  ) -> Result<Self> {
    if library_id.trim().is_empty() {
      return Err(MigrateError::Config("Zotero library id is required".into()));
    }
    if api_key.trim().is_empty() {
      return Err(MigrateError::Config("Zotero API key is required".into()));
    }

    let mut root = Url::parse(base_url)?;
    if !root.path().ends_with('/') {
      let path = format!("{}/", root.path());
      root.set_path(&path);
    }
    let library =
      root.join(&format!("{}/{}/", library_type.path_segment(), library_id.trim()))?;
    debug!(library = %library, "Created Zotero client");

    let http = Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .user_agent(concat!("papers2zotero/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      http,
      root,
      library,
      api_key: api_key.trim().to_string(),
      templates: RefCell::new(HashMap::new()),
    })
  }

  /// URL of a path inside the library, e.g. `items` or `collections`.
  pub fn library_url(&self, path: &str) -> Result<Url> { Ok(self.library.join(path)?) }

  fn template_url(&self, item_type: ItemType) -> Result<Url> {
    let mut url = self.root.join("items/new")?;
    url.query_pairs_mut().append_pair("itemType", item_type.as_str());
    Ok(url)
  }

  /// Sends a request with the authentication headers, turning error statuses into
  /// [`MigrateError::Api`].
  fn send(&self, request: RequestBuilder) -> Result<Response> {
    let response = request
      .header("Zotero-API-Key", &self.api_key)
      .header("Zotero-API-Version", API_VERSION)
      .send()?;
    checked(response)
  }

  /// POSTs items to the library and parses the write response.
  fn post_items(&self, items: &[Item]) -> Result<CreateResponse> {
    let response = self.send(self.http.post(self.library_url("items")?).json(items))?;
    Ok(response.json()?)
  }

  /// Stores the content of an `imported_file` attachment item.
  ///
  /// The server first authorizes the upload from the file's md5, size and mtime. Unless it
  /// already holds that file, the bytes go to the returned URL wrapped in the given prefix and
  /// suffix, and the upload is then registered against the item.
  fn upload_file(&self, item_key: &str, attachment: &Attachment) -> Result<()> {
    let file = LocalFile::read(&attachment.path)?;
    let url = self.library_url(&format!("items/{item_key}/file"))?;

    let authorization: UploadAuthorization = self
      .send(self.http.post(url.clone()).header("If-None-Match", "*").form(&[
        ("md5", file.md5.clone()),
        ("filename", file.filename.clone()),
        ("filesize", file.content.len().to_string()),
        ("mtime", file.mtime.to_string()),
      ]))?
      .json()?;

    let (upload_url, content_type, prefix, suffix, upload_key) = match authorization {
      UploadAuthorization::Exists { .. } => {
        debug!(item = item_key, md5 = %file.md5, "File already stored");
        return Ok(());
      },
      UploadAuthorization::Upload { url, content_type, prefix, suffix, upload_key } =>
        (url, content_type, prefix, suffix, upload_key),
    };

    let mut body = Vec::with_capacity(prefix.len() + file.content.len() + suffix.len());
    body.extend_from_slice(prefix.as_bytes());
    body.extend_from_slice(&file.content);
    body.extend_from_slice(suffix.as_bytes());

    // The storage host gets no API key.
    checked(self.http.post(upload_url).header(CONTENT_TYPE, content_type).body(body).send()?)?;

    self.send(
      self.http.post(url).header("If-None-Match", "*").form(&[("upload", upload_key.as_str())]),
    )?;
    debug!(
      item = item_key,
      filename = %file.filename,
      size = file.content.len(),
      "Uploaded attachment"
    );
    Ok(())
  }
}

impl ZoteroApi for ZoteroClient {
  fn item_template(&self, item_type: ItemType) -> Result<Item> {
    if let Some(template) = self.templates.borrow().get(&item_type) {
      return Ok(template.clone());
    }

    trace!(item_type = %item_type, "Fetching item template");
    let response = self.send(self.http.get(self.template_url(item_type)?))?;
    let template: Item = response.json()?;
    self.templates.borrow_mut().insert(item_type, template.clone());
    Ok(template)
  }

  fn check_items(&self, items: &[Item]) -> Result<()> {
    validate_items(items, |item_type| self.item_template(item_type))
  }

  fn create_items(&self, items: &[Item]) -> Result<CreateResponse> {
    if items.is_empty() {
      return Ok(CreateResponse::default());
    }
    debug!(count = items.len(), "Creating items");
    self.post_items(items)
  }

  fn attachment_simple(&self, attachments: &[Attachment], parent_key: &str) -> Result<()> {
    let present: Vec<&Attachment> = attachments
      .iter()
      .filter(|attachment| {
        let exists = attachment.path.is_file();
        if !exists {
          warn!(path = %attachment.path.display(), parent = parent_key, "Attachment file missing");
        }
        exists
      })
      .collect();

    for chunk in present.chunks(MAX_WRITE_ITEMS) {
      let items: Vec<Item> =
        chunk.iter().map(|attachment| imported_file(attachment, parent_key)).collect();
      let response = self.post_items(&items)?;
      for (idx, failure) in response.failures()? {
        warn!(
          parent = parent_key,
          index = idx,
          code = failure.code,
          message = %failure.message,
          "Attachment rejected"
        );
      }
      for (idx, key) in response.written()? {
        if let Some(attachment) = chunk.get(idx) {
          self.upload_file(&key, attachment)?;
        }
      }
    }
    Ok(())
  }

  fn collections(&self) -> Result<Vec<RemoteCollection>> {
    let mut collections = Vec::new();
    loop {
      let mut url = self.library_url("collections")?;
      url
        .query_pairs_mut()
        .append_pair("limit", &COLLECTIONS_PAGE_SIZE.to_string())
        .append_pair("start", &collections.len().to_string());

      let page: Vec<CollectionEntry> = self.send(self.http.get(url))?.json()?;
      let done = page.len() < COLLECTIONS_PAGE_SIZE;
      collections.extend(page.into_iter().map(|entry| entry.data));
      if done {
        break;
      }
    }
    trace!(count = collections.len(), "Listed collections");
    Ok(collections)
  }

  fn create_collection(&self, names: &[String]) -> Result<()> {
    let payload: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
    for chunk in payload.chunks(MAX_WRITE_ITEMS) {
      let response = self.send(self.http.post(self.library_url("collections")?).json(chunk))?;
      let response: CreateResponse = response.json()?;
      if let Some((idx, failure)) = response.failures()?.first() {
        let name = chunk.get(*idx).and_then(|c| c.get("name")).cloned().unwrap_or_default();
        return Err(MigrateError::Api {
          status:  u16::try_from(failure.code).unwrap_or_default(),
          message: format!("collection {name} was not created: {}", failure.message),
        });
      }
    }
    Ok(())
  }

  fn addto_collection(&self, collection_key: &str, item_key: &str) -> Result<()> {
    let url = self.library_url(&format!("items/{item_key}"))?;
    let entry: ItemEntry = self.send(self.http.get(url.clone()))?.json()?;
    if entry.data.collections.iter().any(|key| key == collection_key) {
      trace!(collection = collection_key, item = item_key, "Item already in collection");
      return Ok(());
    }

    let mut collections = entry.data.collections;
    collections.push(collection_key.to_string());
    self.send(
      self
        .http
        .patch(url)
        .header("If-Unmodified-Since-Version", entry.version.to_string())
        .json(&json!({ "collections": collections })),
    )?;
    Ok(())
  }
}

/// Turns an error status into [`MigrateError::Api`] carrying the response body.
fn checked(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let message = response.text().unwrap_or_default();
  Err(MigrateError::Api { status: status.as_u16(), message: message.trim().to_string() })
}

fn file_name(path: &Path) -> String {
  path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Child attachment item whose file content is stored in Zotero.
fn imported_file(attachment: &Attachment, parent_key: &str) -> Item {
  let filename = file_name(&attachment.path);

  let mut item = Item::new();
  item.insert("itemType".into(), json!("attachment"));
  item.insert("parentItem".into(), json!(parent_key));
  item.insert("linkMode".into(), json!("imported_file"));
  item.insert("title".into(), json!(filename));
  item.insert("filename".into(), json!(filename));
  item.insert("contentType".into(), json!(attachment.content_type));
  item.insert("tags".into(), json!([]));
  item.insert("relations".into(), json!({}));
  item
}
