//! Capture controller: camera session, frame hand-off and scan status.
//!
//! The controller lives on the UI thread. It pulls the latest frame from the
//! camera, hands it to the [`Scanner`] and turns scanner notifications into
//! [`ScanStatus`] updates. In manual mode a frame is sent for an online
//! search on request; in automatic mode every new frame runs through the
//! offline [`pipeline`].

pub mod pipeline;
pub mod tracker;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{CameraCapture, CameraError};
use crate::engine::{BarcodeFormat, FormatSet, RecognitionEngine};
use crate::error::ScannerError;
use crate::scanner::{Scanner, ScannerDelegate};

pub use pipeline::{scan_frame, ScanResult};
pub use tracker::{ResultTracker, DEFAULT_LOCK_MISSES, DEFAULT_RESULT_HOLD};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    /// Live preview, no search outstanding
    #[default]
    Default,
    /// An online search is outstanding
    Searching,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Default => write!(f, "default"),
            ScanState::Searching => write!(f, "searching"),
        }
    }
}

/// Everything the UI shows about the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanStatus {
    /// The database has records, or a sync has finished
    pub ready: bool,
    pub syncing: bool,
    /// Number of image records in the local database
    pub images: usize,
    /// Barcode formats being decoded
    pub formats: FormatSet,
    /// Result on display
    pub result: Option<ScanResult>,
    pub state: ScanState,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = if self.syncing {
            "syncing"
        } else if self.ready {
            "ready"
        } else {
            "waiting"
        };
        write!(
            f,
            "[{}] {} images | formats: {} | {}",
            phase, self.images, self.formats, self.state
        )?;
        match &self.result {
            Some(result) => write!(f, " | {}", result),
            None => Ok(()),
        }
    }
}

/// Receives status updates from the controller.
pub trait StatusListener {
    fn status_changed(&mut self, status: &ScanStatus);
}

impl<F: FnMut(&ScanStatus)> StatusListener for F {
    fn status_changed(&mut self, status: &ScanStatus) {
        self(status)
    }
}

/// How the controller scans.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub formats: FormatSet,
    pub lock_misses: u32,
    pub result_hold: Duration,
    /// Run the offline pipeline on every frame instead of waiting for `capture()`
    pub auto: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            formats: FormatSet::empty()
                .with(BarcodeFormat::Ean13)
                .with(BarcodeFormat::QrCode),
            lock_misses: DEFAULT_LOCK_MISSES,
            result_hold: DEFAULT_RESULT_HOLD,
            auto: true,
        }
    }
}

/// Drives a camera and a scanner.
pub struct ScanController<E: RecognitionEngine> {
    scanner: Arc<Scanner<E>>,
    camera: CameraCapture,
    options: ScanOptions,
    state: ScanState,
    tracker: ResultTracker,
    status: ScanStatus,
    published: Option<ScanStatus>,
    listener: Option<Box<dyn StatusListener>>,
    last_sequence: u64,
    /// Epoch of the outstanding online search
    search_epoch: Option<u64>,
}

impl<E: RecognitionEngine> fmt::Debug for ScanController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}

impl<E: RecognitionEngine> ScanController<E> {
    pub fn new(scanner: Arc<Scanner<E>>, camera: CameraCapture, options: ScanOptions) -> Self {
        let status = ScanStatus {
            formats: options.formats.clone(),
            ..ScanStatus::default()
        };
        Self {
            scanner,
            camera,
            tracker: ResultTracker::new(options.lock_misses, options.result_hold),
            options,
            state: ScanState::Default,
            status,
            published: None,
            listener: None,
            last_sequence: 0,
            search_epoch: None,
        }
    }

    pub fn set_listener(&mut self, listener: impl StatusListener + 'static) {
        self.listener = Some(Box::new(listener));
        self.published = None;
        self.publish();
    }

    pub fn scanner(&self) -> &Arc<Scanner<E>> {
        &self.scanner
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.camera.is_running()
    }

    /// Start the camera session.
    pub fn start(&mut self) -> Result<(), CameraError> {
        self.camera.start()?;
        self.last_sequence = 0;
        self.refresh_images();
        self.publish();
        Ok(())
    }

    /// Stop the camera session, cancelling any outstanding search.
    pub fn stop(&mut self) {
        self.cancel();
        self.camera.stop();
        self.tracker.reset();
        self.status.result = None;
        self.publish();
    }

    /// Send the latest frame for an online search.
    ///
    /// Returns `false` if the trigger was ignored: a search is already
    /// outstanding, or no frame is available.
    pub fn capture(&mut self) -> bool {
        self.reconcile_search();
        if self.state == ScanState::Searching {
            log::debug!("Capture ignored: a search is already outstanding");
            return false;
        }

        let Some(frame) = self.camera.get_frame() else {
            log::debug!("Capture ignored: no frame available");
            return false;
        };
        let query = match frame.to_query() {
            Ok(query) => query,
            Err(e) => {
                log::warn!("Unusable frame {}: {}", frame.sequence, e);
                return false;
            }
        };

        log::info!("Searching frame {} online", frame.sequence);
        self.search_epoch = Some(self.scanner.api_search(query));
        self.state = ScanState::Searching;
        self.status.result = None;
        self.publish();
        true
    }

    /// Abandon the outstanding search, if any.
    pub fn cancel(&mut self) {
        if self.state != ScanState::Searching {
            return;
        }
        self.scanner.cancel_api_search();
        self.search_epoch = None;
        self.state = ScanState::Default;
        log::info!("Search cancelled");
        self.publish();
    }

    /// Run the automatic pipeline on the latest frame, if it is new.
    ///
    /// Returns `true` if a frame was scanned. Does nothing in manual mode or
    /// while a search is outstanding.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.reconcile_search();
        if !self.options.auto || self.state == ScanState::Searching {
            return false;
        }

        let frame = match self.camera.get_frame() {
            Some(frame) if frame.sequence != self.last_sequence => frame,
            _ => {
                if self.tracker.expire(now) {
                    self.status.result = None;
                    self.publish();
                }
                return false;
            }
        };
        self.last_sequence = frame.sequence;

        let query = match frame.to_query() {
            Ok(query) => query,
            Err(e) => {
                log::warn!("Unusable frame {}: {}", frame.sequence, e);
                return false;
            }
        };

        let found = scan_frame(
            &self.scanner,
            &query,
            &self.options.formats,
            self.tracker.locked(),
        );
        if self.tracker.observe(found, now) {
            self.status.result = self.tracker.displayed().cloned();
            if let Some(result) = &self.status.result {
                log::info!("Found {}", result);
            }
            self.publish();
        }
        true
    }

    /// Leave `Searching` if the scanner cancelled the search behind our back.
    fn reconcile_search(&mut self) {
        let Some(epoch) = self.search_epoch else {
            return;
        };
        if self.state == ScanState::Searching && self.scanner.search_epoch() != epoch {
            log::info!("Outstanding search was cancelled by the scanner");
            self.search_epoch = None;
            self.state = ScanState::Default;
            self.publish();
        }
    }

    fn refresh_images(&mut self) {
        match self.scanner.count() {
            Ok(images) => {
                self.status.images = images;
                self.status.ready |= images > 0;
            }
            Err(e) => log::warn!("Could not count records: {}", e),
        }
    }

    fn publish(&mut self) {
        self.status.state = self.state;
        if self.published.as_ref() == Some(&self.status) {
            return;
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.status_changed(&self.status);
        }
        self.published = Some(self.status.clone());
    }
}

impl<E: RecognitionEngine> ScannerDelegate for ScanController<E> {
    fn will_sync(&mut self) {
        self.status.syncing = true;
        self.publish();
    }

    fn did_sync(&mut self) {
        self.status.syncing = false;
        self.status.ready = true;
        self.refresh_images();
        log::info!("Database ready with {} images", self.status.images);
        self.publish();
    }

    fn failed_to_sync(&mut self, error: &ScannerError) {
        log::error!("Sync failed: {}", error);
        self.status.syncing = false;
        self.status.ready = true;
        self.publish();
    }

    fn did_search(&mut self, result: Option<&str>) {
        if self.state != ScanState::Searching {
            log::debug!("Ignoring search result with no search outstanding");
            return;
        }
        self.search_epoch = None;
        self.state = ScanState::Default;
        self.status.result = result.map(|uid| ScanResult::Image(uid.to_string()));
        match result {
            Some(uid) => log::info!("Online search matched {}", uid),
            None => log::info!("Online search found nothing"),
        }
        self.publish();
    }

    fn failed_to_search(&mut self, error: &ScannerError) {
        log::error!("Online search failed: {}", error);
        self.search_epoch = None;
        self.state = ScanState::Default;
        self.publish();
    }
}

impl<E: RecognitionEngine> Drop for ScanController<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}
