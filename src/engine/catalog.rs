//! Catalog - the local database file used by the reference engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::barcode::BarcodeFormat;
use crate::error::ScannerError;

/// An image record: a uid and the fingerprint of its reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub uid: String,
    pub fingerprint: String,
}

/// A barcode record: the fingerprint of a frame showing the code, plus its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarcodeRecord {
    pub fingerprint: String,
    pub format: BarcodeFormat,
    pub text: String,
}

/// Contents of the local database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Revision of the last sync (0 = never synced)
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub records: Vec<ImageRecord>,
    #[serde(default)]
    pub barcodes: Vec<BarcodeRecord>,
}

impl Catalog {
    /// Read a catalog file.
    ///
    /// A missing or empty file is an empty catalog. Any other read failure is
    /// an I/O error, and unparsable content is a catalog error.
    pub fn load(path: &Path) -> Result<Self, ScannerError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Catalog::default()),
            Err(e) => return Err(ScannerError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(Catalog::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            ScannerError::Catalog(format!("{}: {}", path.display(), e))
        })
    }

    /// Write the catalog atomically: serialize to a sibling temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<(), ScannerError> {
        let tmp = temp_path(path);
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn find_image(&self, fingerprint: &str) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.fingerprint == fingerprint)
    }

    pub fn find_uid(&self, uid: &str) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.uid == uid)
    }

    pub fn find_barcode(&self, fingerprint: &str) -> impl Iterator<Item = &BarcodeRecord> {
        let fingerprint = fingerprint.to_string();
        self.barcodes
            .iter()
            .filter(move |b| b.fingerprint == fingerprint)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Catalog {
        Catalog {
            revision: 7,
            records: vec![ImageRecord {
                uid: "poster-1".to_string(),
                fingerprint: "aa".to_string(),
            }],
            barcodes: vec![BarcodeRecord {
                fingerprint: "bb".to_string(),
                format: BarcodeFormat::Ean13,
                text: "9780201379624".to_string(),
            }],
        }
    }

    #[test]
    fn test_missing_file_is_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load(&dir.path().join("absent.db")).unwrap();
        assert_eq!(catalog, Catalog::default());
    }

    #[test]
    fn test_empty_file_is_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::write(&path, "").unwrap();
        assert_eq!(Catalog::load(&path).unwrap(), Catalog::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.db");
        sample().save(&path).unwrap();

        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded, sample());
        assert!(!temp_path(&path).exists(), "temp file should be renamed away");
    }

    #[test]
    fn test_corrupt_file_is_catalog_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.db");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Catalog::load(&path),
            Err(ScannerError::Catalog(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let catalog = sample();
        assert_eq!(catalog.find_image("aa").unwrap().uid, "poster-1");
        assert!(catalog.find_image("bb").is_none());
        assert!(catalog.find_uid("poster-1").is_some());
        assert_eq!(catalog.find_barcode("bb").count(), 1);
        assert_eq!(catalog.find_barcode("aa").count(), 0);
    }
}
