//! FileSink - appends one record per line to a log file

use crate::record::EventRecord;
use crate::sink::{Sink, SinkError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

enum FileState {
    /// Not opened yet; the first emit opens the file.
    Pending,
    Open(LineWriter<File>),
    /// Target directory missing. Every emit is a no-op.
    Unavailable,
    Closed,
}

/// Sink that appends UTF-8 lines to a file, opened on first use.
pub struct FileSink {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileState::Pending),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once the sink has given up because its directory is missing.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            FileState::Unavailable
        )
    }

    fn open(&self) -> Result<FileState, SinkError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Ok(FileState::Unavailable);
            }
        }

        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Ok(FileState::Open(LineWriter::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(FileState::Unavailable),
            Err(e) => Err(SinkError::Io(e)),
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn emit(&self, _event: &EventRecord, payload: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, FileState::Pending) {
            *state = self.open()?;
        }

        match &mut *state {
            FileState::Open(writer) => {
                writeln!(writer, "{}", payload)?;
                Ok(())
            }
            FileState::Unavailable => Ok(()),
            FileState::Closed => Err(SinkError::Closed),
            FileState::Pending => Ok(()),
        }
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *state, FileState::Closed);
        if let FileState::Open(mut writer) = previous {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_is_lazy_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "existing\n").unwrap();

        let sink = FileSink::new(&path);
        let event = EventRecord::new(Level::Info, "x");
        sink.emit(&event, "first").unwrap();
        sink.emit(&event, "second ünïcode").unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "existing\nfirst\nsecond ünïcode\n");
    }

    #[test]
    fn test_file_sink_does_not_touch_disk_before_first_emit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.log");
        let sink = FileSink::new(&path);
        sink.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_directory_is_a_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("run.log");

        let sink = FileSink::new(&path);
        let event = EventRecord::new(Level::Error, "x");
        assert!(sink.emit(&event, "dropped").is_ok());
        assert!(sink.is_unavailable());
        assert!(sink.emit(&event, "dropped again").is_ok());
        assert!(!path.exists());
    }

    #[test]
    fn test_close_twice() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("a.log"));
        sink.emit(&EventRecord::new(Level::Info, "x"), "x").unwrap();
        assert!(sink.close().is_ok());
        assert!(sink.close().is_ok());
    }
}
