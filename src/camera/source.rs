//! Frame sources: where the capture loop gets its frames.

use std::path::{Path, PathBuf};

use super::types::{CameraError, Frame};
use crate::engine::PixelFormat;

/// File extensions [`ImageDirSource`] picks up.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// A camera, as seen by the capture loop.
pub trait FrameSource: Send + 'static {
    /// Prepare the device. Called on the capture thread before the first frame.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Produce the next frame, or `None` if no frame is ready yet.
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Release the device. Called on the capture thread after the last frame.
    fn close(&mut self);
}

/// Replays the images of a directory, in name order, as a looping camera.
#[derive(Debug)]
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            next: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            CameraError::OpenFailed(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::NoFrames(self.dir.clone()));
        }

        log::info!("Replaying {} images from {}", files.len(), self.dir.display());
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.files.is_empty() {
            return Ok(None);
        }

        let path = &self.files[self.next % self.files.len()];
        self.next = (self.next + 1) % self.files.len();

        let img = image::open(path)
            .map_err(|e| CameraError::ReadFailed(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Some(Frame::new(img.into_raw(), width, height, PixelFormat::Rgb8)))
    }

    fn close(&mut self) {
        self.files.clear();
    }
}

/// A fixed list of frames, handed out once each (or forever when looping).
#[derive(Debug, Default)]
pub struct StillSource {
    frames: Vec<Frame>,
    next: usize,
    looping: bool,
}

impl StillSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            next: 0,
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

impl FrameSource for StillSource {
    fn open(&mut self) -> Result<(), CameraError> {
        self.next = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }
        let mut frame = self.frames[self.next].clone();
        frame.timestamp = std::time::Instant::now();
        self.next += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, value: u8) {
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([value, value, value]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_image_dir_source_cycles_in_name_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::new(dir.path());
        source.open().unwrap();

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        let third = source.next_frame().unwrap().unwrap();
        assert_eq!(first.data[0], 10);
        assert_eq!(second.data[0], 20);
        assert_eq!(third.data[0], 10);
        assert_eq!((first.width, first.height), (4, 3));
        assert_eq!(first.format, PixelFormat::Rgb8);
    }

    #[test]
    fn test_image_dir_source_empty_dir() {
        let dir = TempDir::new().unwrap();
        let mut source = ImageDirSource::new(dir.path());
        assert!(matches!(source.open(), Err(CameraError::NoFrames(_))));
    }

    #[test]
    fn test_image_dir_source_missing_dir() {
        let dir = TempDir::new().unwrap();
        let mut source = ImageDirSource::new(dir.path().join("absent"));
        assert!(matches!(source.open(), Err(CameraError::OpenFailed(_))));
    }

    #[test]
    fn test_still_source_runs_out() {
        let frame = Frame::new(vec![1; 4], 2, 2, PixelFormat::Gray8);
        let mut source = StillSource::new(vec![frame]);
        source.open().unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_still_source_looping() {
        let frame = Frame::new(vec![1; 4], 2, 2, PixelFormat::Gray8);
        let mut source = StillSource::new(vec![frame]).looping();
        source.open().unwrap();
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
    }
}
