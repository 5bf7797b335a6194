//! Automatic scan pipeline: what a single frame shows.
//!
//! Each frame goes through three steps, stopping at the first hit:
//! 1. locking: confirm the previous result on the new frame
//! 2. offline image search
//! 3. barcode decoding over the enabled formats

use std::fmt;

use crate::engine::{Barcode, BarcodeFormat, FormatSet, QueryImage, RecognitionEngine};
use crate::scanner::Scanner;

/// Something recognized in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScanResult {
    /// A catalog image, by uid
    Image(String),
    Ean8(String),
    Ean13(String),
    QrCode(String),
}

impl ScanResult {
    /// The uid or decoded text.
    pub fn value(&self) -> &str {
        match self {
            ScanResult::Image(v)
            | ScanResult::Ean8(v)
            | ScanResult::Ean13(v)
            | ScanResult::QrCode(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScanResult::Image(_) => "image",
            ScanResult::Ean8(_) => BarcodeFormat::Ean8.name(),
            ScanResult::Ean13(_) => BarcodeFormat::Ean13.name(),
            ScanResult::QrCode(_) => BarcodeFormat::QrCode.name(),
        }
    }
}

impl From<Barcode> for ScanResult {
    fn from(barcode: Barcode) -> Self {
        match barcode.format {
            BarcodeFormat::Ean8 => ScanResult::Ean8(barcode.text),
            BarcodeFormat::Ean13 => ScanResult::Ean13(barcode.text),
            BarcodeFormat::QrCode => ScanResult::QrCode(barcode.text),
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.value())
    }
}

/// Run the pipeline on one frame.
///
/// Engine errors are logged and the failing step is skipped.
pub fn scan_frame<E: RecognitionEngine>(
    scanner: &Scanner<E>,
    query: &QueryImage,
    formats: &FormatSet,
    previous: Option<&ScanResult>,
) -> Option<ScanResult> {
    if let Some(previous) = previous {
        if still_visible(scanner, query, previous) {
            return Some(previous.clone());
        }
    }

    match scanner.search(query) {
        Ok(Some(uid)) => return Some(ScanResult::Image(uid)),
        Ok(None) => {}
        Err(e) => log::warn!("Offline search failed: {}", e),
    }

    match scanner.decode(query, formats) {
        Ok(found) => found.map(ScanResult::from),
        Err(e) => {
            log::warn!("Barcode decoding failed: {}", e);
            None
        }
    }
}

/// Whether `previous` is still in view. Only images and QR codes can be locked.
fn still_visible<E: RecognitionEngine>(
    scanner: &Scanner<E>,
    query: &QueryImage,
    previous: &ScanResult,
) -> bool {
    let verified = match previous {
        ScanResult::Image(uid) => scanner.match_uid(query, uid),
        ScanResult::QrCode(text) => scanner
            .decode(query, &FormatSet::empty().with(BarcodeFormat::QrCode))
            .map(|found| found.is_some_and(|barcode| barcode.text == *text)),
        ScanResult::Ean8(_) | ScanResult::Ean13(_) => return false,
    };

    verified.unwrap_or_else(|e| {
        log::debug!("Locking failed: {}", e);
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_conversion() {
        let result = ScanResult::from(Barcode {
            format: BarcodeFormat::Ean13,
            text: "4006381333931".to_string(),
        });
        assert_eq!(result, ScanResult::Ean13("4006381333931".to_string()));
        assert_eq!(result.to_string(), "ean13: 4006381333931");
    }

    #[test]
    fn test_equality_needs_kind_and_value() {
        assert_ne!(
            ScanResult::Ean8("123".to_string()),
            ScanResult::Ean13("123".to_string())
        );
        assert_eq!(ScanResult::Image("a".to_string()).kind(), "image");
        assert_eq!(ScanResult::QrCode("x".to_string()).value(), "x");
    }
}
