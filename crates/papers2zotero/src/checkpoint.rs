//! Durable record of the publications already imported.
//!
//! A [`Checkpoint`] holds two collections: the committed ids, which are known to be in Zotero
//! and are persisted, and the staged ids, which belong to the batch currently being uploaded.
//! Staged ids only become committed through [`Checkpoint::commit`], which writes the merged set
//! to a temporary file next to the checkpoint and atomically renames it into place. A failed
//! write leaves both the file and the in-memory committed set as they were.
//!
//! The file is a JSON array of publication ids. A missing file is an empty checkpoint.
//!
//! ```no_run
//! use papers2zotero::checkpoint::Checkpoint;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut checkpoint = Checkpoint::open("papers2zotero.json")?;
//! if !checkpoint.contains(42) {
//!   checkpoint.add(42);
//!   // ... upload publication 42 ...
//!   checkpoint.commit()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::io::Write;

use tempfile::NamedTempFile;

use super::*;

/// Committed and staged publication ids, optionally backed by a file.
#[derive(Debug, Default)]
pub struct Checkpoint {
  path:      Option<PathBuf>,
  committed: BTreeSet<i64>,
  staged:    Vec<i64>,
}

impl Checkpoint {
  /// Opens the checkpoint stored at `path`, starting empty if the file doesn't exist yet.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let committed = match std::fs::read_to_string(&path) {
      Ok(content) if content.trim().is_empty() => BTreeSet::new(),
      Ok(content) => serde_json::from_str(&content)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
      Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), count = committed.len(), "Loaded checkpoint");
    Ok(Self { path: Some(path), committed, staged: Vec::new() })
  }

  /// A checkpoint that is never written to disk.
  pub fn in_memory() -> Self { Self::default() }

  /// The backing file, if any.
  pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

  /// Whether `id` has been committed.
  pub fn contains(&self, id: i64) -> bool { self.committed.contains(&id) }

  /// Stages `id` for the next commit.
  pub fn add(&mut self, id: i64) { self.staged.push(id); }

  /// Drops every staged entry for `id`. Returns whether anything was staged.
  pub fn remove(&mut self, id: i64) -> bool {
    let before = self.staged.len();
    self.staged.retain(|staged| *staged != id);
    self.staged.len() != before
  }

  /// Staged ids, in the order they were added.
  pub fn staged(&self) -> &[i64] { &self.staged }

  /// Committed ids.
  pub fn committed(&self) -> &BTreeSet<i64> { &self.committed }

  /// Merges the staged ids into the committed set and persists it.
  ///
  /// On error nothing changes: the file keeps its previous content and the staged ids stay
  /// staged, so the caller can still roll them back.
  pub fn commit(&mut self) -> Result<()> {
    if self.staged.is_empty() {
      return Ok(());
    }
    let merged = merge(&self.committed, &self.staged);
    if let Some(path) = &self.path {
      persist(path, &merged)?;
    }
    trace!(staged = self.staged.len(), total = merged.len(), "Committed checkpoint");
    self.committed = merged;
    self.staged.clear();
    Ok(())
  }

  /// Forgets the staged ids without persisting anything.
  pub fn rollback(&mut self) {
    if !self.staged.is_empty() {
      debug!(count = self.staged.len(), "Rolling back staged checkpoint entries");
    }
    self.staged.clear();
  }
}

/// The committed set after a commit of `staged`.
pub fn merge(committed: &BTreeSet<i64>, staged: &[i64]) -> BTreeSet<i64> {
  committed.iter().chain(staged).copied().collect()
}

/// Writes `ids` to `path` through a temporary file in the same directory.
fn persist(path: &Path, ids: &BTreeSet<i64>) -> Result<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  let mut file = NamedTempFile::new_in(&dir)?;
  serde_json::to_writer(&mut file, ids)?;
  file.write_all(b"\n")?;
  file.as_file().sync_all()?;
  file.persist(path)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_merge_is_pure() {
    let committed = BTreeSet::from([1, 2]);
    let merged = merge(&committed, &[3, 2, 5]);
    assert_eq!(merged, BTreeSet::from([1, 2, 3, 5]));
    assert_eq!(committed, BTreeSet::from([1, 2]));
  }

  #[test]
  fn test_stage_commit_rollback() -> anyhow::Result<()> {
    let mut checkpoint = Checkpoint::in_memory();
    checkpoint.add(1);
    checkpoint.add(2);
    assert!(!checkpoint.contains(1));

    assert!(checkpoint.remove(2));
    assert!(!checkpoint.remove(7));
    checkpoint.commit()?;
    assert!(checkpoint.contains(1));
    assert!(!checkpoint.contains(2));
    assert!(checkpoint.staged().is_empty());

    checkpoint.add(3);
    checkpoint.rollback();
    checkpoint.commit()?;
    assert!(!checkpoint.contains(3));
    assert_eq!(checkpoint.committed().len(), 1);
    Ok(())
  }

  #[traced_test]
  #[test]
  fn test_persisted_round_trip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("checkpoint.json");

    let mut checkpoint = Checkpoint::open(&path)?;
    assert!(checkpoint.committed().is_empty());
    assert!(!path.exists());

    checkpoint.add(10);
    checkpoint.add(4);
    checkpoint.commit()?;
    assert_eq!(std::fs::read_to_string(&path)?.trim(), "[4,10]");

    checkpoint.add(99);
    drop(checkpoint);

    let reopened = Checkpoint::open(&path)?;
    assert_eq!(reopened.committed(), &BTreeSet::from([4, 10]));
    assert!(!reopened.contains(99));
    Ok(())
  }

  #[test]
  fn test_failed_commit_keeps_state() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("missing-dir").join("checkpoint.json");

    let mut checkpoint = Checkpoint::open(&path)?;
    checkpoint.add(1);
    assert!(checkpoint.commit().is_err());
    assert!(!checkpoint.contains(1));
    assert_eq!(checkpoint.staged(), &[1]);
    Ok(())
  }

  #[test]
  fn test_failed_commit_leaves_target_untouched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, "[1,2]")?;
    let mut checkpoint = Checkpoint::open(&path)?;

    // A directory now sits where the checkpoint file was
    std::fs::remove_file(&path)?;
    std::fs::create_dir(&path)?;
    std::fs::write(path.join("keep.txt"), "keep")?;

    checkpoint.add(3);
    assert!(checkpoint.commit().is_err());
    assert_eq!(checkpoint.committed(), &BTreeSet::from([1, 2]));
    assert_eq!(checkpoint.staged(), &[3]);
    assert!(path.is_dir());
    assert_eq!(std::fs::read_to_string(path.join("keep.txt"))?, "keep");
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

    checkpoint.rollback();
    assert!(checkpoint.staged().is_empty());
    Ok(())
  }

  #[test]
  fn test_corrupt_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, "not json")?;
    assert!(matches!(Checkpoint::open(&path), Err(MigrateError::Json(_))));
    Ok(())
  }
}
