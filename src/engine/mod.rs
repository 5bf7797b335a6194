//! Recognition engine capability interface.
//!
//! The engine performs the actual work (local database sync, offline and
//! online image search, barcode decoding). This crate only orchestrates it:
//! - [`RecognitionEngine`] is the capability every engine implements
//! - [`QueryImage`] and [`FormatSet`] are the inputs it consumes
//! - [`ReferenceEngine`] is a digest-keyed engine for development and tests

mod barcode;
mod catalog;
mod image;
mod reference;

use std::path::Path;

use crate::error::ScannerError;

pub use barcode::{Barcode, BarcodeFormat, FormatSet};
pub use catalog::{BarcodeRecord, Catalog, ImageRecord};
pub use image::{Orientation, PixelFormat, QueryImage};
pub use reference::{fingerprint, ReferenceEngine};

/// Operations offered by a recognition engine handle.
///
/// Implementations are not expected to be thread-safe: every method takes
/// `&mut self` and the [`crate::scanner::Scanner`] facade guarantees that at
/// most one call is active at a time. Every method is fallible.
pub trait RecognitionEngine: Send + 'static {
    /// Open the engine on the local database file at `db_path`.
    fn open(&mut self, db_path: &Path) -> Result<(), ScannerError>;

    /// Release the database file.
    fn close(&mut self) -> Result<(), ScannerError>;

    /// Number of image records in the local database.
    fn count(&mut self) -> Result<usize, ScannerError>;

    /// Identifiers of every image record, in database order.
    fn info(&mut self) -> Result<Vec<String>, ScannerError>;

    /// Offline search over the local database. `None` means no match.
    fn search(&mut self, query: &QueryImage) -> Result<Option<String>, ScannerError>;

    /// Check whether `query` shows the record `uid`.
    fn match_uid(&mut self, query: &QueryImage, uid: &str) -> Result<bool, ScannerError>;

    /// Online search against the remote service. `None` means no match.
    fn api_search(&mut self, query: &QueryImage) -> Result<Option<String>, ScannerError>;

    /// Refresh the local database from the remote service.
    fn sync(&mut self) -> Result<(), ScannerError>;

    /// Look for a barcode of one of the requested `formats`.
    fn decode(
        &mut self,
        query: &QueryImage,
        formats: &FormatSet,
    ) -> Result<Option<Barcode>, ScannerError>;
}
