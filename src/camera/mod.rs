//! Camera capture: frame sources and the background capture thread.
//!
//! - Frame sources via [`FrameSource`], [`ImageDirSource`] and [`StillSource`]
//! - Camera capture via [`CameraCapture`]
//! - Configuration via [`CameraSettings`]

mod capture;
mod capture_loop;
mod source;
mod types;

pub use capture::CameraCapture;
pub use source::{FrameSource, ImageDirSource, StillSource};
pub use types::{CameraError, CameraSettings, Frame};
