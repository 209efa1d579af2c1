//! Append-only JSONL sink. The first write failure disables the sink so a full
//! disk never takes the daemon down with it.

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, SrdError};

#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    file: Option<File>,
}

impl JsonlWriter {
    /// Open (creating parent directories) in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SrdError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SrdError::io(&path, e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.file.is_none()
    }

    /// Append one record as a single line.
    ///
    /// Returns the error that degraded the sink, once; later calls are no-ops.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Option<SrdError> {
        let file = self.file.as_mut()?;
        let result = serde_json::to_vec(record)
            .map_err(SrdError::from)
            .and_then(|mut line| {
                line.push(b'\n');
                file.write_all(&line).map_err(|e| SrdError::io(&self.path, e))
            });
        match result {
            Ok(()) => None,
            Err(err) => {
                self.file = None;
                Some(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row<'a> {
        event: &'a str,
        n: u32,
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/activity.jsonl");
        let mut writer = JsonlWriter::open(&path).unwrap();
        assert!(writer.append(&Row { event: "a", n: 1 }).is_none());
        assert!(writer.append(&Row { event: "b", n: 2 }).is_none());
        drop(writer);

        let mut reopened = JsonlWriter::open(&path).unwrap();
        assert!(reopened.append(&Row { event: "c", n: 3 }).is_none());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], r#"{"event":"b","n":2}"#);
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let err = JsonlWriter::open(blocker.join("activity.jsonl")).unwrap_err();
        assert_eq!(err.code(), "SRD-3002");
    }
}
