//! The JSONL log file.

use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared handle to an append-only log file.
///
/// Each event holds the lock for its whole line, so lines from concurrent
/// threads never interleave. Output is flushed at every newline.
#[derive(Clone)]
pub struct JsonlFile {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl JsonlFile {
    /// Open `path` for appending, creating missing parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }
}

/// Writer for a single event.
pub struct JsonlFileWriter<'a>(MutexGuard<'a, LineWriter<File>>);

impl Write for JsonlFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for JsonlFile {
    type Writer = JsonlFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        JsonlFileWriter(self.file.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_appended_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("deskvault.jsonl");

        let first = JsonlFile::open(&path).unwrap();
        writeln!(first.make_writer(), "{{\"n\":1}}").unwrap();
        drop(first);

        let second = JsonlFile::open(&path).unwrap();
        writeln!(second.make_writer(), "{{\"n\":2}}").unwrap();

        // Visible without an explicit flush.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[test]
    fn test_open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonlFile::open(dir.path()).is_err());
    }
}
