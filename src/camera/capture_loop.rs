//! Background capture thread implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::source::FrameSource;
use super::types::{CameraError, CameraSettings, Frame};

/// Commands sent to the capture thread.
pub enum CaptureCommand {
    Stop,
}

/// Consecutive read failures after which the loop gives up.
const MAX_READ_FAILURES: u32 = 10;

/// Run the capture loop in a background thread.
///
/// Hands the source back when the loop ends so the owner can start it again.
pub fn run_capture_loop(
    mut source: Box<dyn FrameSource>,
    settings: CameraSettings,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
    rx: Receiver<CaptureCommand>,
    info_tx: Sender<Result<(), CameraError>>,
) -> Box<dyn FrameSource> {
    if let Err(e) = source.open() {
        let _ = info_tx.send(Err(e));
        return source;
    }
    let _ = info_tx.send(Ok(()));

    let interval = settings.frame_interval();
    let mut sequence: u64 = 0;
    let mut failures = 0;

    while !stop.load(Ordering::Relaxed) {
        if let Ok(CaptureCommand::Stop) = rx.try_recv() {
            break;
        }

        let started = Instant::now();
        match source.next_frame() {
            Ok(Some(mut frame)) => {
                failures = 0;
                sequence += 1;
                frame.sequence = sequence;
                frame.orientation = settings.orientation;
                if let Ok(mut buf) = buffer.lock() {
                    *buf = Some(frame);
                }
            }
            Ok(None) => {}
            Err(e) => {
                failures += 1;
                log::warn!("{}", e);
                if failures >= MAX_READ_FAILURES {
                    log::error!("Camera failed {} times in a row, stopping capture", failures);
                    break;
                }
            }
        }

        sleep_until_next(started, interval, &stop);
    }

    source.close();
    log::debug!("Capture loop stopped after {} frames", sequence);
    source
}

/// Sleep out the rest of the frame interval in small steps so a stop request is seen quickly.
fn sleep_until_next(started: Instant, interval: Duration, stop: &AtomicBool) {
    let step = Duration::from_millis(5);
    loop {
        let elapsed = started.elapsed();
        if elapsed >= interval || stop.load(Ordering::Relaxed) {
            return;
        }
        thread::sleep(step.min(interval - elapsed));
    }
}
