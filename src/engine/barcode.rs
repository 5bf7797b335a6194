//! Barcode symbologies and decode results.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A barcode symbology the engine can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeFormat {
    Ean8,
    Ean13,
    #[serde(rename = "qrcode")]
    QrCode,
}

impl BarcodeFormat {
    /// Every supported symbology.
    pub const ALL: [BarcodeFormat; 3] = [
        BarcodeFormat::Ean8,
        BarcodeFormat::Ean13,
        BarcodeFormat::QrCode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BarcodeFormat::Ean8 => "ean8",
            BarcodeFormat::Ean13 => "ean13",
            BarcodeFormat::QrCode => "qrcode",
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BarcodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "ean8" => Ok(BarcodeFormat::Ean8),
            "ean13" => Ok(BarcodeFormat::Ean13),
            "qr" | "qrcode" => Ok(BarcodeFormat::QrCode),
            other => Err(format!(
                "Unknown barcode format '{}'. Available formats: ean8, ean13, qrcode",
                other
            )),
        }
    }
}

/// A set of requested symbologies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSet {
    formats: BTreeSet<BarcodeFormat>,
}

impl FormatSet {
    /// The empty set: nothing will be decoded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every supported symbology.
    pub fn all() -> Self {
        BarcodeFormat::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, format: BarcodeFormat) -> bool {
        self.formats.insert(format)
    }

    pub fn with(mut self, format: BarcodeFormat) -> Self {
        self.formats.insert(format);
        self
    }

    pub fn contains(&self, format: BarcodeFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = BarcodeFormat> + '_ {
        self.formats.iter().copied()
    }
}

impl FromIterator<BarcodeFormat> for FormatSet {
    fn from_iter<I: IntoIterator<Item = BarcodeFormat>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for FormatSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.iter().map(|fmt| fmt.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Parses a comma-separated list such as `"ean13,qrcode"`. `"none"` or an
/// empty string yields the empty set.
impl FromStr for FormatSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(FormatSet::empty());
        }
        trimmed
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(BarcodeFormat::from_str)
            .collect()
    }
}

/// A decoded barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub format: BarcodeFormat,
    pub text: String,
}
