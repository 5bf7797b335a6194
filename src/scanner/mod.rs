//! Scanner - the facade owning the recognition engine handle.
//!
//! Every engine call, synchronous or queued, goes through one mutex, so the
//! engine never sees two operations at once. Long-latency work runs on two
//! lanes:
//! - the sync lane holds at most one database refresh
//! - the search lane runs online searches in submission order
//!
//! Results of queued work reach the application through [`Notifications`].

mod lane;
mod notify;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::{Barcode, FormatSet, QueryImage, RecognitionEngine};
use crate::error::ScannerError;

use lane::Lane;
use notify::EventSender;

pub use notify::{Notifications, ScannerDelegate, ScannerEvent};

/// The engine plus its lifecycle state.
struct EngineSlot<E> {
    engine: E,
    open: bool,
}

/// State shared between the facade and its lane jobs.
struct Shared<E> {
    slot: Mutex<EngineSlot<E>>,
    db_path: PathBuf,
    syncing: AtomicBool,
    /// Bumped by every cancellation; search jobs remember the epoch they were queued in
    search_epoch: Arc<AtomicU64>,
    pending_searches: AtomicUsize,
    events: EventSender,
}

impl<E: RecognitionEngine> Shared<E> {
    fn lock(&self) -> Result<MutexGuard<'_, EngineSlot<E>>, ScannerError> {
        self.slot.lock().map_err(|_| {
            ScannerError::Io(std::io::Error::other(
                "engine handle poisoned by a panicked operation",
            ))
        })
    }

    /// Run `op` with exclusive access to an open engine.
    fn with_engine<T>(
        &self,
        what: &str,
        op: impl FnOnce(&mut E) -> Result<T, ScannerError>,
    ) -> Result<T, ScannerError> {
        let mut slot = self.lock()?;
        if !slot.open {
            log::debug!("{} rejected: scanner is closed", what);
            return Err(ScannerError::NotOpen);
        }
        log::trace!("engine: {}", what);
        op(&mut slot.engine)
    }

    fn is_cancelled(&self, epoch: u64) -> bool {
        self.search_epoch.load(Ordering::SeqCst) != epoch
    }

    fn run_sync(&self) {
        self.events.post(ScannerEvent::WillSync);
        log::info!("Sync started");

        let result = self.with_engine("sync", |engine| engine.sync());
        self.syncing.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                log::info!("Sync completed");
                self.events.post(ScannerEvent::DidSync);
            }
            Err(e) => {
                log::warn!("Sync failed: {}", e);
                self.events.post(ScannerEvent::FailedToSync(e));
            }
        }
    }

    fn run_api_search(&self, query: QueryImage, epoch: u64) {
        let outcome = if self.is_cancelled(epoch) {
            Ok(None)
        } else {
            self.with_engine("api_search", |engine| {
                // cancelled while waiting for the handle
                if self.is_cancelled(epoch) {
                    return Ok(None);
                }
                engine.api_search(&query).map(Some)
            })
        };
        drop(query);
        self.pending_searches.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(None) => log::debug!("Skipped cancelled online search"),
            Ok(Some(result)) => {
                log::info!("Online search finished: {:?}", result);
                self.events
                    .post_search(ScannerEvent::DidSearch(result), epoch);
            }
            Err(e) => {
                log::warn!("Online search failed: {}", e);
                self.events
                    .post_search(ScannerEvent::FailedToSearch(e), epoch);
            }
        }
    }
}

/// Facade over one recognition engine handle.
///
/// Created once by the application entry point and shared by reference (or
/// `Arc`) with the components that need it. Dropping the scanner cancels
/// pending searches, stops both lanes and closes the engine.
pub struct Scanner<E: RecognitionEngine> {
    shared: Arc<Shared<E>>,
    sync_lane: Lane,
    search_lane: Lane,
}

impl<E: RecognitionEngine> std::fmt::Debug for Scanner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("db_path", &self.shared.db_path)
            .field("is_syncing", &self.is_syncing())
            .field("pending_searches", &self.pending_searches())
            .finish_non_exhaustive()
    }
}

impl<E: RecognitionEngine> Scanner<E> {
    /// Wrap `engine`, to be opened on the database file at `db_path`.
    ///
    /// Returns the scanner and the notification pump that delivers the
    /// results of background jobs.
    ///
    /// # Errors
    /// * `ScannerError::Io` - If a lane worker thread cannot be spawned
    pub fn new(
        engine: E,
        db_path: impl Into<PathBuf>,
    ) -> Result<(Self, Notifications), ScannerError> {
        let search_epoch = Arc::new(AtomicU64::new(0));
        let (events, notifications) = notify::channel(Arc::clone(&search_epoch));

        let shared = Arc::new(Shared {
            slot: Mutex::new(EngineSlot {
                engine,
                open: false,
            }),
            db_path: db_path.into(),
            syncing: AtomicBool::new(false),
            search_epoch,
            pending_searches: AtomicUsize::new(0),
            events,
        });

        let scanner = Self {
            shared,
            sync_lane: Lane::spawn("sync")?,
            search_lane: Lane::spawn("search")?,
        };
        Ok((scanner, notifications))
    }

    /// Path of the local database file.
    pub fn db_path(&self) -> &Path {
        &self.shared.db_path
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().map(|slot| slot.open).unwrap_or(false)
    }

    /// Open the engine on the database file.
    ///
    /// Opening an already open scanner does nothing.
    ///
    /// # Errors
    /// * `ScannerError::Io` - If the file cannot be created or opened, or the
    ///   engine fails to initialize
    pub fn open(&self) -> Result<(), ScannerError> {
        let mut slot = self.shared.lock()?;
        if slot.open {
            log::warn!("Scanner already open, ignoring open()");
            return Ok(());
        }

        let path = &self.shared.db_path;
        slot.engine.open(path).map_err(|e| match e {
            ScannerError::Io(_) => e,
            other => ScannerError::Io(std::io::Error::other(format!(
                "failed to open {}: {}",
                path.display(),
                other
            ))),
        })?;
        slot.open = true;
        log::info!("Scanner opened on {}", path.display());
        Ok(())
    }

    /// Close the engine.
    ///
    /// Pending online searches are cancelled first, then the call waits for
    /// the in-flight engine operation (if any) before closing. A sync still
    /// queued afterwards fails with `ScannerError::NotOpen`.
    pub fn close(&self) -> Result<(), ScannerError> {
        self.cancel_api_search();

        let mut slot = self.shared.lock()?;
        if !slot.open {
            return Ok(());
        }
        // stays open if the engine still holds the database
        slot.engine.close()?;
        slot.open = false;
        log::info!("Scanner closed");
        Ok(())
    }

    /// Refresh the local database in the background.
    ///
    /// Does nothing while a sync is already pending. The delegate receives
    /// `will_sync`, then `did_sync` or `failed_to_sync`.
    pub fn sync(&self) {
        if self
            .shared
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Sync already pending, ignoring request");
            return;
        }

        let shared = Arc::clone(&self.shared);
        if !self.sync_lane.submit(Box::new(move || shared.run_sync())) {
            self.shared.syncing.store(false, Ordering::SeqCst);
            log::error!("Sync lane is not running");
        }
    }

    /// Whether a sync job is queued or running.
    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::SeqCst)
    }

    /// Number of records in the local database.
    pub fn count(&self) -> Result<usize, ScannerError> {
        self.shared.with_engine("count", |engine| engine.count())
    }

    /// Identifiers of every record in the local database.
    pub fn info(&self) -> Result<Vec<String>, ScannerError> {
        self.shared.with_engine("info", |engine| engine.info())
    }

    /// Offline search over the local database. `None` means no match.
    pub fn search(&self, query: &QueryImage) -> Result<Option<String>, ScannerError> {
        self.shared.with_engine("search", |engine| engine.search(query))
    }

    /// Check whether `query` shows the record `uid`.
    pub fn match_uid(&self, query: &QueryImage, uid: &str) -> Result<bool, ScannerError> {
        self.shared
            .with_engine("match", |engine| engine.match_uid(query, uid))
    }

    /// Queue an online search. The query is dropped once the job completes.
    ///
    /// The delegate receives `did_search` or `failed_to_search`, unless
    /// [`Scanner::cancel_api_search`] is called first. Returns the search
    /// epoch the job was queued in; once [`Scanner::search_epoch`] moves past
    /// it, the result will never be delivered.
    pub fn api_search(&self, query: QueryImage) -> u64 {
        let epoch = self.shared.search_epoch.load(Ordering::SeqCst);
        self.shared.pending_searches.fetch_add(1, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        if !self
            .search_lane
            .submit(Box::new(move || shared.run_api_search(query, epoch)))
        {
            self.shared.pending_searches.fetch_sub(1, Ordering::SeqCst);
            log::error!("Search lane is not running");
        }
        epoch
    }

    /// Current search epoch, advanced by every cancellation.
    pub fn search_epoch(&self) -> u64 {
        self.shared.search_epoch.load(Ordering::SeqCst)
    }

    /// Cancel every online search queued so far.
    ///
    /// Queued jobs are skipped. A job already inside the engine runs to
    /// completion, but its result is never delivered.
    pub fn cancel_api_search(&self) {
        let epoch = self.shared.search_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Online searches cancelled (epoch {})", epoch);
    }

    /// Online searches queued or running and not yet finished.
    pub fn pending_searches(&self) -> usize {
        self.shared.pending_searches.load(Ordering::SeqCst)
    }

    /// Look for a barcode in one of `formats`. An empty set finds nothing.
    pub fn decode(
        &self,
        query: &QueryImage,
        formats: &FormatSet,
    ) -> Result<Option<Barcode>, ScannerError> {
        self.shared.with_engine("decode", |engine| {
            if formats.is_empty() {
                return Ok(None);
            }
            engine.decode(query, formats)
        })
    }
}

impl<E: RecognitionEngine> Drop for Scanner<E> {
    fn drop(&mut self) {
        self.cancel_api_search();
        self.search_lane.shutdown();
        self.sync_lane.shutdown();
        if let Err(e) = self.close() {
            log::error!("Failed to close scanner: {}", e);
        }
    }
}
