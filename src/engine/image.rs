//! Query images handed to the recognition engine.

use std::fmt;
use std::path::Path;

use crate::error::ScannerError;

/// Pixel layout of a query buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit luminance
    Gray8,
    /// Packed RGB, 3 bytes per pixel
    Rgb8,
    /// Packed BGRA, 4 bytes per pixel (iOS camera output)
    Bgra8,
    /// YUV 4:2:0 semi-planar (Android camera preview)
    Nv21,
}

impl PixelFormat {
    /// Bytes per pixel on the first (or only) plane.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Gray8 | PixelFormat::Nv21 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 => 4,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            PixelFormat::Gray8 => 0,
            PixelFormat::Rgb8 => 1,
            PixelFormat::Bgra8 => 2,
            PixelFormat::Nv21 => 3,
        }
    }
}

/// Device orientation when the frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Up => "up",
            Orientation::Right => "right",
            Orientation::Down => "down",
            Orientation::Left => "left",
        };
        write!(f, "{}", name)
    }
}

/// An immutable pixel buffer plus the metadata the engine needs to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    orientation: Orientation,
}

impl QueryImage {
    /// Wrap a pixel buffer.
    ///
    /// # Errors
    /// `ScannerError::InvalidImage` if the geometry is empty, the stride is
    /// shorter than a row, or the buffer is too small for the geometry.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        orientation: Orientation,
    ) -> Result<Self, ScannerError> {
        if width == 0 || height == 0 {
            return Err(ScannerError::InvalidImage(format!(
                "empty geometry {}x{}",
                width, height
            )));
        }

        let row = width as u64 * format.bytes_per_pixel() as u64;
        if (stride as u64) < row {
            return Err(ScannerError::InvalidImage(format!(
                "stride {} shorter than row of {} bytes",
                stride, row
            )));
        }

        let mut required = stride as u64 * height as u64;
        if format == PixelFormat::Nv21 {
            // interleaved VU plane at half vertical resolution
            required += stride as u64 * height.div_ceil(2) as u64;
        }
        if (data.len() as u64) < required {
            return Err(ScannerError::InvalidImage(format!(
                "buffer holds {} bytes, {} required",
                data.len(),
                required
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
            orientation,
        })
    }

    /// Wrap a tightly packed buffer (stride = row length).
    pub fn packed(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, ScannerError> {
        let stride = width.saturating_mul(format.bytes_per_pixel());
        Self::new(data, width, height, stride, format, Orientation::Up)
    }

    /// Load an image file and convert it to RGB.
    pub fn open(path: &Path) -> Result<Self, ScannerError> {
        let img = image::open(path).map_err(|e| {
            ScannerError::InvalidImage(format!("{}: {}", path.display(), e))
        })?;
        Self::from_dynamic(&img)
    }

    /// Convert a decoded image to an RGB query.
    pub fn from_dynamic(img: &image::DynamicImage) -> Result<Self, ScannerError> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::packed(rgb.into_raw(), width, height, PixelFormat::Rgb8)
    }

    /// Return a copy tagged with a different orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Header bytes identifying the geometry, used when hashing content.
    pub(crate) fn geometry_header(&self) -> [u8; 13] {
        let mut header = [0u8; 13];
        header[0..4].copy_from_slice(&self.width.to_le_bytes());
        header[4..8].copy_from_slice(&self.height.to_le_bytes());
        header[8..12].copy_from_slice(&self.stride.to_le_bytes());
        header[12] = self.format.tag();
        header
    }
}
