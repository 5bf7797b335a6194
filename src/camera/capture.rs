//! Camera capture handle and public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::capture_loop::{run_capture_loop, CaptureCommand};
use super::source::FrameSource;
use super::types::{CameraError, CameraSettings, Frame};

/// Camera capture handle.
///
/// The camera runs a background thread that continuously pulls frames from
/// a [`FrameSource`] and stores the latest frame in a shared buffer. Call
/// `start()` to begin capturing and `get_frame()` to retrieve the latest frame.
pub struct CameraCapture {
    /// The source while idle; the capture thread owns it while running
    source: Option<Box<dyn FrameSource>>,
    /// Latest captured frame (shared with capture thread)
    frame_buffer: Arc<Mutex<Option<Frame>>>,
    /// Capture thread handle, yields the source back on exit
    capture_thread: Option<JoinHandle<Box<dyn FrameSource>>>,
    /// Channel to send commands to capture thread
    command_tx: Option<Sender<CaptureCommand>>,
    /// Signal to stop capture thread
    stop_signal: Arc<AtomicBool>,
    /// Current settings
    settings: CameraSettings,
}

impl std::fmt::Debug for CameraCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraCapture")
            .field("settings", &self.settings)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl CameraCapture {
    /// Wrap a frame source. Nothing is opened until `start()` is called.
    pub fn new(source: Box<dyn FrameSource>, settings: CameraSettings) -> Self {
        Self {
            source: Some(source),
            frame_buffer: Arc::new(Mutex::new(None)),
            capture_thread: None,
            command_tx: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
            settings,
        }
    }

    /// Get the current camera settings.
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Start capturing frames in a background thread.
    ///
    /// The source is opened on the capture thread; this call waits until it
    /// reports success or failure.
    ///
    /// # Errors
    /// * `CameraError::AlreadyRunning` - If capture is already running
    /// * `CameraError::StreamFailed` - If the capture thread cannot be started
    /// * Any error the source reports while opening
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.is_running() {
            return Err(CameraError::AlreadyRunning);
        }
        // A thread that ended on its own still holds the source
        self.reclaim_source();

        let source = self.source.take().ok_or(CameraError::AlreadyRunning)?;

        self.stop_signal.store(false, Ordering::SeqCst);
        if let Ok(mut buf) = self.frame_buffer.lock() {
            *buf = None;
        }

        let (tx, rx) = mpsc::channel();
        self.command_tx = Some(tx);

        let buffer = Arc::clone(&self.frame_buffer);
        let stop = Arc::clone(&self.stop_signal);
        let settings = self.settings.clone();

        let (info_tx, info_rx) = mpsc::channel::<Result<(), CameraError>>();

        let handle = std::thread::Builder::new()
            .name("scan-camera".to_string())
            .spawn(move || run_capture_loop(source, settings, buffer, stop, rx, info_tx))
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        self.capture_thread = Some(handle);

        match info_rx.recv() {
            Ok(Ok(())) => {
                log::info!("Camera started at {} fps", self.settings.fps);
                Ok(())
            }
            Ok(Err(e)) => {
                self.stop();
                Err(e)
            }
            Err(_) => {
                self.stop();
                Err(CameraError::StreamFailed(
                    "Capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    /// Stop the capture thread.
    ///
    /// This will signal the background thread to stop and wait for it to finish.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);

        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(CaptureCommand::Stop);
        }

        self.reclaim_source();
    }

    /// Get the latest captured frame.
    ///
    /// Returns `None` if no frame has been captured yet.
    pub fn get_frame(&self) -> Option<Frame> {
        let buffer = self.frame_buffer.lock().ok()?;
        buffer.clone()
    }

    /// Check if the capture thread is currently running.
    pub fn is_running(&self) -> bool {
        self.capture_thread
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn reclaim_source(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            match handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => log::error!("Capture thread panicked, frame source lost"),
            }
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
