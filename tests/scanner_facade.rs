//! Integration tests for the Scanner facade.
//!
//! A scripted engine records every call so the tests can check what
//! actually reached the engine and how calls overlapped.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scan_relay::engine::{
    Barcode, BarcodeFormat, FormatSet, PixelFormat, QueryImage, RecognitionEngine,
};
use scan_relay::error::{ErrorKind, ScannerError};
use scan_relay::scanner::{Notifications, Scanner, ScannerEvent};
use tempfile::TempDir;

/// Shared view into the scripted engine.
#[derive(Default)]
struct Probe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl Probe {
    fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }
}

/// Marks an engine call as active for as long as it lives.
struct ActiveCall(Arc<Probe>);

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedEngine {
    probe: Arc<Probe>,
    /// How long every call takes
    delay: Duration,
    uids: Vec<String>,
    search_answer: Option<String>,
    sync_offline: bool,
    /// Number of upcoming `close` calls that fail
    close_failures: usize,
}

impl ScriptedEngine {
    fn new(probe: &Arc<Probe>) -> Self {
        Self {
            probe: Arc::clone(probe),
            delay: Duration::from_millis(0),
            uids: Vec::new(),
            search_answer: None,
            sync_offline: false,
            close_failures: 0,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn enter(&self, name: &str) -> ActiveCall {
        let now_active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.probe.calls.lock().unwrap().push(name.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        ActiveCall(Arc::clone(&self.probe))
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn open(&mut self, _db_path: &Path) -> Result<(), ScannerError> {
        let _call = self.enter("open");
        Ok(())
    }

    fn close(&mut self) -> Result<(), ScannerError> {
        let _call = self.enter("close");
        if self.close_failures > 0 {
            self.close_failures -= 1;
            return Err(ScannerError::Io(std::io::Error::other("database busy")));
        }
        Ok(())
    }

    fn count(&mut self) -> Result<usize, ScannerError> {
        let _call = self.enter("count");
        Ok(self.uids.len())
    }

    fn info(&mut self) -> Result<Vec<String>, ScannerError> {
        let _call = self.enter("info");
        Ok(self.uids.clone())
    }

    fn search(&mut self, _query: &QueryImage) -> Result<Option<String>, ScannerError> {
        let _call = self.enter("search");
        Ok(None)
    }

    fn match_uid(&mut self, _query: &QueryImage, uid: &str) -> Result<bool, ScannerError> {
        let _call = self.enter("match");
        Ok(self.uids.iter().any(|u| u == uid))
    }

    fn api_search(&mut self, _query: &QueryImage) -> Result<Option<String>, ScannerError> {
        let _call = self.enter("api_search");
        Ok(self.search_answer.clone())
    }

    fn sync(&mut self) -> Result<(), ScannerError> {
        let _call = self.enter("sync");
        if self.sync_offline {
            return Err(ScannerError::Network {
                message: "no route to host".to_string(),
                attempts: 1,
            });
        }
        self.uids.push(format!("uid-{}", self.uids.len() + 1));
        Ok(())
    }

    fn decode(
        &mut self,
        _query: &QueryImage,
        formats: &FormatSet,
    ) -> Result<Option<Barcode>, ScannerError> {
        let _call = self.enter("decode");
        Ok(formats.iter().next().map(|format| Barcode {
            format,
            text: "123".to_string(),
        }))
    }
}

fn query() -> QueryImage {
    QueryImage::packed(vec![3; 16], 4, 4, PixelFormat::Gray8).unwrap()
}

fn open_scanner(dir: &TempDir, engine: ScriptedEngine) -> (Scanner<ScriptedEngine>, Notifications) {
    let (scanner, pump) = Scanner::new(engine, dir.path().join("scan.db")).unwrap();
    scanner.open().unwrap();
    (scanner, pump)
}

/// Collect events until none arrives for `quiet`.
fn drain(pump: &Notifications, quiet: Duration) -> Vec<ScannerEvent> {
    let mut events = Vec::new();
    while let Some(event) = pump.next_timeout(quiet) {
        events.push(event);
    }
    events
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

// === Sync ===

#[test]
fn test_repeated_sync_runs_once() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let engine = ScriptedEngine::new(&probe).with_delay(Duration::from_millis(50));
    let (scanner, pump) = open_scanner(&dir, engine);

    for _ in 0..10 {
        scanner.sync();
        assert!(scanner.is_syncing());
    }

    assert!(wait_until(Duration::from_secs(5), || !scanner.is_syncing()));
    let events = drain(&pump, Duration::from_millis(200));

    assert_eq!(probe.count("sync"), 1);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ScannerEvent::WillSync));
    assert!(matches!(events[1], ScannerEvent::DidSync));
    assert_eq!(scanner.count().unwrap(), 1);
}

#[test]
fn test_sync_can_run_again_after_completion() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, pump) = open_scanner(&dir, ScriptedEngine::new(&probe));

    scanner.sync();
    assert!(wait_until(Duration::from_secs(5), || !scanner.is_syncing()));
    scanner.sync();
    assert!(wait_until(Duration::from_secs(5), || !scanner.is_syncing()));

    drain(&pump, Duration::from_millis(100));
    assert_eq!(probe.count("sync"), 2);
    assert_eq!(scanner.info().unwrap(), vec!["uid-1", "uid-2"]);
}

#[test]
fn test_sync_without_network_reports_network_error() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let mut engine = ScriptedEngine::new(&probe);
    engine.sync_offline = true;
    let (scanner, pump) = open_scanner(&dir, engine);

    scanner.sync();
    let events = drain(&pump, Duration::from_millis(300));

    assert!(matches!(events[0], ScannerEvent::WillSync));
    match &events[1] {
        ScannerEvent::FailedToSync(e) => assert_eq!(e.kind(), ErrorKind::Network),
        other => panic!("Expected FailedToSync, got {:?}", other),
    }
    assert!(!events.iter().any(|e| matches!(e, ScannerEvent::DidSync)));
}

#[test]
fn test_sync_on_closed_scanner_fails() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, pump) =
        Scanner::new(ScriptedEngine::new(&probe), dir.path().join("scan.db")).unwrap();

    scanner.sync();
    let events = drain(&pump, Duration::from_millis(300));
    assert!(matches!(
        events.last(),
        Some(ScannerEvent::FailedToSync(ScannerError::NotOpen))
    ));
    assert_eq!(probe.count("sync"), 0);
}

// === Online search and cancellation ===

#[test]
fn test_api_search_delivers_result() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let mut engine = ScriptedEngine::new(&probe);
    engine.search_answer = Some("poster-9".to_string());
    let (scanner, pump) = open_scanner(&dir, engine);

    scanner.api_search(query());
    match pump.next_timeout(Duration::from_secs(5)) {
        Some(ScannerEvent::DidSearch(Some(uid))) => assert_eq!(uid, "poster-9"),
        other => panic!("Expected DidSearch, got {:?}", other),
    }
    assert!(wait_until(Duration::from_secs(1), || scanner.pending_searches() == 0));
}

#[test]
fn test_cancel_suppresses_every_earlier_search() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let mut engine = ScriptedEngine::new(&probe).with_delay(Duration::from_millis(100));
    engine.search_answer = Some("poster-1".to_string());
    let (scanner, pump) = open_scanner(&dir, engine);

    for _ in 0..4 {
        scanner.api_search(query());
    }
    // let the first job enter the engine
    assert!(wait_until(Duration::from_secs(5), || probe.count("api_search") == 1));
    scanner.cancel_api_search();

    assert!(wait_until(Duration::from_secs(5), || scanner.pending_searches() == 0));
    let events = drain(&pump, Duration::from_millis(200));

    assert!(events.is_empty(), "unexpected events: {:?}", events);
    assert_eq!(probe.count("api_search"), 1);
}

#[test]
fn test_search_after_cancel_is_delivered() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, pump) = open_scanner(&dir, ScriptedEngine::new(&probe));

    scanner.api_search(query());
    scanner.cancel_api_search();
    scanner.api_search(query());

    let events = drain(&pump, Duration::from_millis(300));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ScannerEvent::DidSearch(None)));
}

#[test]
fn test_close_cancels_pending_searches() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let engine = ScriptedEngine::new(&probe).with_delay(Duration::from_millis(50));
    let (scanner, pump) = open_scanner(&dir, engine);

    scanner.api_search(query());
    scanner.api_search(query());
    scanner.close().unwrap();
    assert!(drain(&pump, Duration::from_millis(300)).is_empty());

    scanner.api_search(query());
    match pump.next_timeout(Duration::from_secs(5)) {
        Some(ScannerEvent::FailedToSearch(ScannerError::NotOpen)) => {}
        other => panic!("Expected FailedToSearch(NotOpen), got {:?}", other),
    }
}

#[test]
fn test_failed_close_leaves_scanner_open() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let mut engine = ScriptedEngine::new(&probe);
    engine.close_failures = 1;
    let (scanner, _pump) = open_scanner(&dir, engine);

    let err = scanner.close().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(scanner.is_open());
    assert_eq!(scanner.count().unwrap(), 0);

    // the second attempt reaches the engine again
    scanner.close().unwrap();
    assert!(!scanner.is_open());
    assert_eq!(probe.count("close"), 2);

    scanner.open().unwrap();
    assert_eq!(probe.count("open"), 2);
}

// === Synchronous operations ===

#[test]
fn test_decode_with_no_formats_skips_engine() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, _pump) = open_scanner(&dir, ScriptedEngine::new(&probe));

    assert_eq!(scanner.decode(&query(), &FormatSet::empty()).unwrap(), None);
    assert_eq!(probe.count("decode"), 0);

    let ean8 = FormatSet::empty().with(BarcodeFormat::Ean8);
    let found = scanner.decode(&query(), &ean8).unwrap().unwrap();
    assert_eq!(found.format, BarcodeFormat::Ean8);
    assert_eq!(probe.count("decode"), 1);
}

#[test]
fn test_match_unknown_uid_is_false() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, _pump) = open_scanner(&dir, ScriptedEngine::new(&probe));
    assert!(!scanner.match_uid(&query(), "uid-123").unwrap());
}

#[test]
fn test_closed_scanner_never_reaches_engine() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, _pump) =
        Scanner::new(ScriptedEngine::new(&probe), dir.path().join("scan.db")).unwrap();

    let err = scanner.search(&query()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(scanner.decode(&query(), &FormatSet::all()).is_err());
    assert!(scanner.count().is_err());
    assert!(probe.calls.lock().unwrap().is_empty());
}

#[test]
fn test_engine_never_sees_concurrent_calls() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let engine = ScriptedEngine::new(&probe).with_delay(Duration::from_millis(2));
    let (scanner, pump) = open_scanner(&dir, engine);
    let scanner = Arc::new(scanner);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let scanner = Arc::clone(&scanner);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    scanner.search(&query()).unwrap();
                    scanner.decode(&query(), &FormatSet::all()).unwrap();
                }
            })
        })
        .collect();

    for _ in 0..10 {
        scanner.api_search(query());
    }
    scanner.sync();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(wait_until(Duration::from_secs(10), || {
        scanner.pending_searches() == 0 && !scanner.is_syncing()
    }));
    drain(&pump, Duration::from_millis(100));

    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(probe.count("api_search"), 10);
    assert_eq!(probe.count("search"), 40);
}

#[test]
fn test_drop_closes_engine() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(Probe::default());
    let (scanner, _pump) = open_scanner(&dir, ScriptedEngine::new(&probe));
    drop(scanner);
    assert_eq!(probe.count("close"), 1);
}
