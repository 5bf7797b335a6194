//! Subcommand handlers.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::args::ConfigAction;
use crate::api::{ApiClient, API_KEY_ENV};
use crate::camera::{CameraCapture, CameraSettings, ImageDirSource};
use crate::config::{default_path as get_config_path, Config};
use crate::controller::{ScanController, ScanStatus};
use crate::engine::{FormatSet, QueryImage, ReferenceEngine};
use crate::error::ScannerError;
use crate::scanner::{Notifications, Scanner, ScannerDelegate};

/// How long the scan loop waits for notifications between frames.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Global flag set when Ctrl+C is received.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C was received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Build the reference engine; without an API key only offline operations work.
fn build_engine(config: &Config) -> Result<ReferenceEngine, String> {
    match config.engine.api_key() {
        Some(key) => {
            let client =
                ApiClient::new(key, &config.engine.api_url).map_err(|e| e.to_string())?;
            Ok(ReferenceEngine::new(client))
        }
        None => {
            log::warn!(
                "No API key configured (set engine.api_key or {}), online features disabled",
                API_KEY_ENV
            );
            Ok(ReferenceEngine::offline())
        }
    }
}

/// Create and open the scanner on the configured database.
pub fn open_scanner(
    config: &Config,
) -> Result<(Scanner<ReferenceEngine>, Notifications), String> {
    let engine = build_engine(config)?;
    let (scanner, notifications) =
        Scanner::new(engine, config.engine.db_path()).map_err(|e| e.to_string())?;
    scanner
        .open()
        .map_err(|e| format!("Failed to open database: {}", e))?;
    Ok((scanner, notifications))
}

fn load_query(path: &Path) -> Result<QueryImage, String> {
    QueryImage::open(path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Waits for the outcome of one background job.
#[derive(Debug, Default)]
struct Outcome {
    result: Option<Result<Option<String>, String>>,
}

impl ScannerDelegate for Outcome {
    fn will_sync(&mut self) {
        println!("Syncing...");
    }

    fn did_sync(&mut self) {
        self.result = Some(Ok(None));
    }

    fn failed_to_sync(&mut self, error: &ScannerError) {
        self.result = Some(Err(format!("Sync failed: {}", error)));
    }

    fn did_search(&mut self, result: Option<&str>) {
        self.result = Some(Ok(result.map(str::to_string)));
    }

    fn failed_to_search(&mut self, error: &ScannerError) {
        self.result = Some(Err(format!("Online search failed: {}", error)));
    }
}

fn wait_for_outcome(notifications: &Notifications) -> Result<Option<String>, String> {
    let mut outcome = Outcome::default();
    loop {
        notifications.dispatch_timeout(&mut outcome, Duration::from_millis(100));
        if let Some(result) = outcome.result.take() {
            return result;
        }
        if ctrlc_received() {
            return Err("Interrupted".to_string());
        }
    }
}

/// Refresh the local database and report the new record count.
pub fn sync(config: &Config) -> Result<(), String> {
    let (scanner, notifications) = open_scanner(config)?;
    scanner.sync();
    wait_for_outcome(&notifications)?;

    let count = scanner.count().map_err(|e| e.to_string())?;
    println!("Synced: {} images", count);
    Ok(())
}

pub fn count(config: &Config) -> Result<(), String> {
    let (scanner, _notifications) = open_scanner(config)?;
    let count = scanner.count().map_err(|e| e.to_string())?;
    println!("{}", count);
    Ok(())
}

pub fn info(config: &Config) -> Result<(), String> {
    let (scanner, _notifications) = open_scanner(config)?;
    let uids = scanner.info().map_err(|e| e.to_string())?;
    if uids.is_empty() {
        println!("Local database is empty. Run 'scan-relay sync' first.");
    }
    for uid in uids {
        println!("{}", uid);
    }
    Ok(())
}

pub fn search(config: &Config, image: &Path) -> Result<(), String> {
    let (scanner, _notifications) = open_scanner(config)?;
    let query = load_query(image)?;
    match scanner.search(&query).map_err(|e| e.to_string())? {
        Some(uid) => println!("{}", uid),
        None => println!("No match"),
    }
    Ok(())
}

pub fn match_uid(config: &Config, image: &Path, uid: &str) -> Result<(), String> {
    let (scanner, _notifications) = open_scanner(config)?;
    let query = load_query(image)?;
    let matched = scanner.match_uid(&query, uid).map_err(|e| e.to_string())?;
    println!("{}", if matched { "Match" } else { "No match" });
    Ok(())
}

pub fn api_search(config: &Config, image: &Path) -> Result<(), String> {
    let (scanner, notifications) = open_scanner(config)?;
    let query = load_query(image)?;
    scanner.api_search(query);
    match wait_for_outcome(&notifications)? {
        Some(uid) => println!("{}", uid),
        None => println!("No match"),
    }
    Ok(())
}

pub fn decode(config: &Config, image: &Path, formats: Option<FormatSet>) -> Result<(), String> {
    let formats = match formats {
        Some(formats) => formats,
        None => config.scan.options().map_err(|e| e.to_string())?.formats,
    };
    let (scanner, _notifications) = open_scanner(config)?;
    let query = load_query(image)?;
    match scanner.decode(&query, &formats).map_err(|e| e.to_string())? {
        Some(barcode) => println!("{}: {}", barcode.format, barcode.text),
        None => println!("No barcode found ({})", formats),
    }
    Ok(())
}

fn print_status(status: &ScanStatus) {
    println!("{}", status);
}

/// Forward every line typed on stdin as a capture trigger.
fn spawn_enter_listener() -> Receiver<()> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Scan frames from a directory until Ctrl+C.
pub fn scan(
    config: &Config,
    source: Option<PathBuf>,
    manual: bool,
    fps: Option<u32>,
) -> Result<(), String> {
    let source = source
        .or_else(|| config.camera.source.clone())
        .ok_or("No frame source: pass --source or set camera.source in the config file")?;

    let mut options = config.scan.options().map_err(|e| e.to_string())?;
    if manual {
        options.auto = false;
    }
    let auto = options.auto;

    let settings = CameraSettings {
        fps: fps.unwrap_or(config.camera.fps),
        ..CameraSettings::default()
    };
    let camera = CameraCapture::new(Box::new(ImageDirSource::new(source)), settings);

    let (scanner, notifications) = open_scanner(config)?;
    let scanner = Arc::new(scanner);
    scanner.sync();

    let mut controller = ScanController::new(Arc::clone(&scanner), camera, options);
    controller.set_listener(print_status);
    controller.start().map_err(|e| e.to_string())?;

    let triggers = if auto {
        println!("Scanning, press Ctrl+C to stop.");
        None
    } else {
        println!("Press Enter to search the current frame, Ctrl+C to stop.");
        Some(spawn_enter_listener())
    };

    while !ctrlc_received() {
        notifications.dispatch_timeout(&mut controller, POLL_INTERVAL);

        if let Some(triggers) = &triggers {
            while triggers.try_recv().is_ok() {
                if !controller.capture() {
                    println!("Busy, capture ignored");
                }
            }
        }

        controller.tick(Instant::now());
    }

    controller.stop();
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config: &Config, path: Option<&Path>) {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            match config.to_toml() {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Error: {}", e),
            }
            println!("Database: {}", config.engine.db_path().display());
            println!(
                "API key: {}",
                if config.engine.api_key().is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                eprintln!("Use 'scan-relay config show' to view current settings.");
                std::process::exit(1);
            }

            if let Some(parent) = config_path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    eprintln!("Error creating config directory: {}", e);
                    std::process::exit(1);
                }
            }

            let body = match Config::default().to_toml() {
                Ok(body) => body,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let default_config = format!(
                "# scan-relay configuration\n\
                 # log_level = \"info\"\n\
                 # [engine] api_key falls back to {}\n\n{}",
                API_KEY_ENV, body
            );

            if let Err(e) = std::fs::write(&config_path, default_config) {
                eprintln!("Error writing config file: {}", e);
                std::process::exit(1);
            }

            println!("Created config file: {}", config_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_records_first_result() {
        let mut outcome = Outcome::default();
        outcome.did_search(Some("uid-1"));
        assert!(matches!(outcome.result, Some(Ok(Some(ref uid))) if uid == "uid-1"));
    }

    #[test]
    fn test_outcome_wraps_failures() {
        let mut outcome = Outcome::default();
        outcome.failed_to_sync(&ScannerError::MissingApiKey);
        let err = outcome.result.take().unwrap().unwrap_err();
        assert_eq!(err, "Sync failed: API key not configured");
    }

    #[test]
    fn test_scan_requires_a_source() {
        let config = Config::default();
        let err = scan(&config, None, false, None).unwrap_err();
        assert!(err.starts_with("No frame source"));
    }
}
