//! Camera types and data structures.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::engine::{Orientation, PixelFormat, QueryImage};
use crate::error::ScannerError;

/// A captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Device orientation at capture time
    pub orientation: Orientation,
    /// Position in the capture stream, assigned by the capture loop
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// A tightly packed frame captured now.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            orientation: Orientation::Up,
            sequence: 0,
            timestamp: Instant::now(),
        }
    }

    /// Get the number of bytes per pixel on the first plane.
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel() as usize
    }

    /// Copy this frame into a query image for the recognition engine.
    pub fn to_query(&self) -> Result<QueryImage, ScannerError> {
        let stride = self.width.saturating_mul(self.format.bytes_per_pixel());
        QueryImage::new(
            self.data.clone(),
            self.width,
            self.height,
            stride,
            self.format,
            self.orientation,
        )
    }
}

/// Settings for camera capture.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Target FPS (actual may vary)
    pub fps: u32,
    /// Orientation stamped on captured frames
    pub orientation: Orientation,
}

impl CameraSettings {
    /// Time between two frame requests.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fps: 10,
            orientation: Orientation::Up,
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug)]
pub enum CameraError {
    /// The frame source has nothing to offer
    NoFrames(PathBuf),
    /// Failed to open the frame source
    OpenFailed(String),
    /// Failed to read a frame
    ReadFailed(String),
    /// Failed to start the capture thread
    StreamFailed(String),
    /// Capture thread is already running
    AlreadyRunning,
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoFrames(path) => {
                write!(f, "No images found in '{}'", path.display())
            }
            CameraError::OpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::ReadFailed(msg) => write!(f, "Failed to read frame: {}", msg),
            CameraError::StreamFailed(msg) => write!(f, "Failed to start camera stream: {}", msg),
            CameraError::AlreadyRunning => write!(f, "Capture thread is already running"),
        }
    }
}

impl std::error::Error for CameraError {}
