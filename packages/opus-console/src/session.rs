//! Persisted "currently displayed" identifiers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConsoleError, Result};

/// Which document, manuscript and paragraph the console is looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub manuscript_id: Option<String>,
    #[serde(default)]
    pub paragraph_id: Option<String>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none() && self.manuscript_id.is_none() && self.paragraph_id.is_none()
    }

    pub fn is_current_document(&self, document_id: &str) -> bool {
        self.document_id.as_deref() == Some(document_id)
    }

    pub fn is_current_paragraph(&self, paragraph_id: &str) -> bool {
        self.paragraph_id.as_deref() == Some(paragraph_id)
    }
}

/// JSON file holding a [`Session`] between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the session. A missing file is an empty session.
    pub fn load(&self) -> Result<Session> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved session");
                return Ok(Session::default());
            }
            Err(source) => return Err(self.io_error(source)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the session, creating parent directories as needed.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let raw = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, raw).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> ConsoleError {
        ConsoleError::SessionIo {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        let session = store.load().unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn saves_into_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("state").join("session.json"));
        let session = Session {
            document_id: Some("D7".into()),
            manuscript_id: None,
            paragraph_id: Some("P123".into()),
        };

        store.save(&session).unwrap();

        assert_eq!(store.load().unwrap(), session);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"paragraph_id": "P1"}"#).unwrap();

        let session = SessionStore::new(&path).load().unwrap();
        assert!(session.is_current_paragraph("P1"));
        assert!(session.document_id.is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let err = SessionStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ConsoleError::SessionFormat(_)));
    }
}
