//! ReferenceEngine - a digest-keyed engine backed by a local catalog file.
//!
//! Queries are resolved by exact content fingerprint, which is enough to
//! exercise the scanner end to end without a proprietary recognition SDK.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::barcode::{Barcode, FormatSet};
use super::catalog::Catalog;
use super::image::QueryImage;
use super::RecognitionEngine;
use crate::api::{ApiClient, SearchRequest};
use crate::error::ScannerError;

/// SHA-256 (hex) of a query's geometry and pixel bytes.
pub fn fingerprint(query: &QueryImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.geometry_header());
    hasher.update(query.data());
    hex::encode(hasher.finalize())
}

/// Engine state while a database file is open.
struct OpenDb {
    path: PathBuf,
    catalog: Catalog,
}

/// Recognition engine resolving queries against a synced catalog.
pub struct ReferenceEngine {
    client: Option<ApiClient>,
    runtime: Option<tokio::runtime::Runtime>,
    db: Option<OpenDb>,
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("online", &self.client.is_some())
            .field("db", &self.db.as_ref().map(|db| &db.path))
            .finish_non_exhaustive()
    }
}

impl ReferenceEngine {
    /// An engine that can sync and search online through `client`.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client: Some(client),
            runtime: None,
            db: None,
        }
    }

    /// An engine without a service: sync and online search fail with
    /// `ScannerError::MissingApiKey`.
    pub fn offline() -> Self {
        Self {
            client: None,
            runtime: None,
            db: None,
        }
    }

    fn db(&self) -> Result<&OpenDb, ScannerError> {
        self.db.as_ref().ok_or(ScannerError::NotOpen)
    }

    fn client(&self) -> Result<ApiClient, ScannerError> {
        self.client.clone().ok_or(ScannerError::MissingApiKey)
    }

    /// The engine's own runtime for service requests, created on first use.
    fn runtime(&mut self) -> Result<&tokio::runtime::Runtime, ScannerError> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?,
        };
        Ok(self.runtime.insert(runtime))
    }
}

impl RecognitionEngine for ReferenceEngine {
    fn open(&mut self, db_path: &Path) -> Result<(), ScannerError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let catalog = Catalog::load(db_path)?;
        if !db_path.exists() {
            catalog.save(db_path)?;
        }

        log::debug!(
            "Opened catalog {} ({} records, revision {})",
            db_path.display(),
            catalog.records.len(),
            catalog.revision
        );
        self.db = Some(OpenDb {
            path: db_path.to_path_buf(),
            catalog,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), ScannerError> {
        if let Some(db) = self.db.take() {
            log::debug!("Closed catalog {}", db.path.display());
        }
        Ok(())
    }

    fn count(&mut self) -> Result<usize, ScannerError> {
        Ok(self.db()?.catalog.records.len())
    }

    fn info(&mut self) -> Result<Vec<String>, ScannerError> {
        Ok(self
            .db()?
            .catalog
            .records
            .iter()
            .map(|r| r.uid.clone())
            .collect())
    }

    fn search(&mut self, query: &QueryImage) -> Result<Option<String>, ScannerError> {
        let db = self.db()?;
        let key = fingerprint(query);
        Ok(db.catalog.find_image(&key).map(|r| r.uid.clone()))
    }

    fn match_uid(&mut self, query: &QueryImage, uid: &str) -> Result<bool, ScannerError> {
        let db = self.db()?;
        Ok(db
            .catalog
            .find_uid(uid)
            .is_some_and(|r| r.fingerprint == fingerprint(query)))
    }

    fn api_search(&mut self, query: &QueryImage) -> Result<Option<String>, ScannerError> {
        self.db()?;
        let request = SearchRequest {
            fingerprint: fingerprint(query),
            width: query.width(),
            height: query.height(),
        };
        let client = self.client()?;
        self.runtime()?.block_on(client.search(&request))
    }

    fn sync(&mut self) -> Result<(), ScannerError> {
        let revision = self.db()?.catalog.revision;
        let client = self.client()?;
        let catalog = self.runtime()?.block_on(client.fetch_catalog(revision))?;

        let db = self.db.as_mut().ok_or(ScannerError::NotOpen)?;
        catalog.save(&db.path)?;
        log::info!(
            "Synced catalog: revision {} -> {}, {} records",
            db.catalog.revision,
            catalog.revision,
            catalog.records.len()
        );
        db.catalog = catalog;
        Ok(())
    }

    fn decode(
        &mut self,
        query: &QueryImage,
        formats: &FormatSet,
    ) -> Result<Option<Barcode>, ScannerError> {
        let db = self.db()?;
        if formats.is_empty() {
            return Ok(None);
        }
        let key = fingerprint(query);
        Ok(db
            .catalog
            .find_barcode(&key)
            .find(|b| formats.contains(b.format))
            .map(|b| Barcode {
                format: b.format,
                text: b.text.clone(),
            }))
    }
}
