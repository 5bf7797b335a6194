//! Background lane: a dedicated worker thread running jobs in FIFO order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single-purpose FIFO execution queue.
pub(crate) struct Lane {
    name: &'static str,
    /// Channel to hand jobs to the worker
    job_tx: Option<Sender<Job>>,
    /// Worker thread handle
    worker: Option<JoinHandle<()>>,
    /// Signal to drop queued jobs and exit
    stop_signal: Arc<AtomicBool>,
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("name", &self.name)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Lane {
    /// Spawn the worker thread for a lane called `name`.
    pub(crate) fn spawn(name: &'static str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);

        let worker = std::thread::Builder::new()
            .name(format!("scan-{}", name))
            .spawn(move || run_lane(name, rx, stop))?;

        Ok(Self {
            name,
            job_tx: Some(tx),
            worker: Some(worker),
            stop_signal,
        })
    }

    /// Queue a job. Returns `false` if the lane has shut down.
    pub(crate) fn submit(&self, job: Job) -> bool {
        match &self.job_tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker: the running job completes, queued jobs are dropped.
    pub(crate) fn shutdown(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);

        // Closing the channel wakes an idle worker
        self.job_tx.take();

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("{} lane worker panicked", self.name);
            }
        }
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_lane(name: &'static str, rx: Receiver<Job>, stop: Arc<AtomicBool>) {
    log::debug!("{} lane started", name);

    for job in rx.iter() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        job();
    }

    log::debug!("{} lane stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_submission_order() {
        let lane = Lane::spawn("test").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            assert!(lane.submit(Box::new(move || seen.lock().unwrap().push(i))));
        }
        assert!(lane.submit(Box::new(move || done_tx.send(()).unwrap())));

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut lane = Lane::spawn("test").unwrap();
        assert!(lane.is_running());
        lane.shutdown();
        assert!(!lane.is_running());
        assert!(!lane.submit(Box::new(|| {})));
    }

    #[test]
    fn test_shutdown_drops_queued_jobs() {
        let mut lane = Lane::spawn("test").unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let ran = Arc::new(AtomicBool::new(false));

        lane.submit(Box::new(move || {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
        }));
        let flag = Arc::clone(&ran);
        lane.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));

        // release the blocking job only after the stop signal is set
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = gate_tx.send(());
        });
        lane.shutdown();
        releaser.join().unwrap();

        assert!(!ran.load(Ordering::SeqCst));
    }
}
