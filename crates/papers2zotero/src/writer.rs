//! Dry-run output: batch entries written as pretty JSON.

use std::{
  fs::File,
  io::{self, BufWriter, Write},
};

use super::*;

/// Writes each entry as a pretty-printed JSON object followed by a newline.
///
/// ```json
/// {
///   "item": { "itemType": "book", "title": "Dune", ... },
///   "notes": [],
///   "attachments": [{ "path": "/Papers2/Files/dune.pdf", "contentType": "application/pdf" }]
/// }
/// ```
pub struct JsonWriter {
  out: Box<dyn Write>,
}

impl JsonWriter {
  /// A writer for `target`, creating (or truncating) the file if needed.
  pub fn open(target: &DryRunTarget) -> Result<Self> {
    let out: Box<dyn Write> = match target {
      DryRunTarget::Stdout => Box::new(io::stdout()),
      DryRunTarget::File(path) => {
        debug!(path = %path.display(), "Writing dry run output to file");
        Box::new(BufWriter::new(File::create(path)?))
      },
    };
    Ok(Self { out })
  }

  /// A writer over any sink.
  pub fn new(out: impl Write + 'static) -> Self { Self { out: Box::new(out) } }

  /// Writes one entry as pretty JSON followed by a newline.
  pub fn write_entry(&mut self, entry: &BatchEntry) -> Result<()> {
    serde_json::to_writer_pretty(&mut self.out, entry)?;
    self.out.write_all(b"\n")?;
    Ok(())
  }

  /// Flushes everything written so far.
  pub fn close(&mut self) -> Result<()> {
    self.out.flush()?;
    Ok(())
  }
}
