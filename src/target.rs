//! Analysis targets: one file plus an optional selected test

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Unit name used when the whole file is analyzed
pub const WHOLE_FILE: &str = "*";

/// Language of a target, detected from its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLanguage {
    Python,
    Shell,
    Other,
}

impl SourceLanguage {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => SourceLanguage::Python,
            Some("sh") | Some("bash") => SourceLanguage::Shell,
            _ => SourceLanguage::Other,
        }
    }
}

/// One unit of code selected for profiling and classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTarget {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    test: Option<String>,
    language: SourceLanguage,
    /// SHA-256 of the source text, absent when the file could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

impl AnalysisTarget {
    /// Resolve a path into a target, reading the file to fingerprint it
    pub fn resolve(path: impl AsRef<Path>, test: Option<String>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let canonical = path.canonicalize().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => LoadError::Missing {
                path: path.to_path_buf(),
            },
            _ => LoadError::Unreadable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        })?;

        if !canonical.is_file() {
            return Err(LoadError::Unreadable {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let bytes = std::fs::read(&canonical).map_err(|err| LoadError::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            language: SourceLanguage::from_path(&canonical),
            path: canonical,
            test: test.filter(|t| !t.is_empty()),
            fingerprint: Some(fingerprint(&bytes)),
        })
    }

    /// Target for a path that failed to resolve; used for sentinel results
    pub fn unresolved(path: impl AsRef<Path>, test: Option<String>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            language: SourceLanguage::from_path(&path),
            path,
            test: test.filter(|t| !t.is_empty()),
            fingerprint: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }

    pub fn language(&self) -> SourceLanguage {
        self.language
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Identity used to decide whether two targets are comparable
    pub fn unit_name(&self) -> &str {
        self.test.as_deref().unwrap_or(WHOLE_FILE)
    }

    /// Read the current source text of the target
    pub fn read_source(&self) -> Result<String, LoadError> {
        std::fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => LoadError::Missing {
                path: self.path.clone(),
            },
            _ => LoadError::Unreadable {
                path: self.path.clone(),
                reason: err.to_string(),
            },
        })
    }

    /// `path` or `path::test` for display
    pub fn display_name(&self) -> String {
        match &self.test {
            Some(test) => format!("{}::{}", self.path.display(), test),
            None => self.path.display().to_string(),
        }
    }
}

/// Hex SHA-256 of source bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_language_detection() {
        assert_eq!(
            SourceLanguage::from_path(Path::new("a/test_x.py")),
            SourceLanguage::Python
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("run.sh")),
            SourceLanguage::Shell
        );
        assert_eq!(
            SourceLanguage::from_path(Path::new("Makefile")),
            SourceLanguage::Other
        );
    }

    #[test]
    fn test_resolve_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test_a.py");
        fs::write(&file, "def test_a():\n    assert True\n").unwrap();

        let target = AnalysisTarget::resolve(&file, Some("test_a".to_string())).unwrap();
        assert!(target.path().is_absolute());
        assert_eq!(target.test(), Some("test_a"));
        assert_eq!(target.unit_name(), "test_a");
        assert_eq!(target.language(), SourceLanguage::Python);
        assert_eq!(target.fingerprint().map(str::len), Some(64));
    }

    #[test]
    fn test_resolve_missing_file() {
        let err = AnalysisTarget::resolve("/nonexistent/test_z.py", None).unwrap_err();
        assert!(matches!(err, LoadError::Missing { .. }));
    }

    #[test]
    fn test_resolve_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisTarget::resolve(dir.path(), None).unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));
    }

    #[test]
    fn test_empty_test_name_means_whole_file() {
        let target = AnalysisTarget::unresolved("x.py", Some(String::new()));
        assert_eq!(target.test(), None);
        assert_eq!(target.unit_name(), WHOLE_FILE);
        assert_eq!(target.fingerprint(), None);
    }

    #[test]
    fn test_fingerprint_is_content_addressed() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abd"));
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
