//! Training on a background thread.
//!
//! `Beacons::train` blocks until the epoch budget is spent. Interactive
//! callers hand the run to [`spawn`] instead and poll the progress channel.
use core::ops::ControlFlow;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver},
    Arc,
};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::{Beacons, Fit, GradientDescent, LogEntry, SolverState, TrainError};

/// Handle to a running training thread.
///
/// Calling [`cancel`](#method.cancel), or dropping the handle, stops the run
/// at its next log snapshot.
pub struct TrainingHandle {
    progress: Receiver<LogEntry>,
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<Result<Fit, TrainError>>,
}

impl TrainingHandle {
    /// Snapshots in epoch order, one per log interval.
    pub fn progress(&self) -> &Receiver<LogEntry> {
        &self.progress
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end. Snapshots not yet received are discarded.
    pub fn join(self) -> Result<Fit, TrainError> {
        // keep the receiver alive until the worker is done, a closed
        // channel reads as cancellation
        let Self {
            progress: _progress,
            thread,
            ..
        } = self;
        thread.join().unwrap_or_else(|_| {
            warn!("training worker panicked");
            Err(TrainError::WorkerPanicked)
        })
    }
}

/// Start training `beacons` on a new thread.
///
/// With `initial == None` the start is drawn like
/// [`Beacons::train`](../struct.Beacons.html#method.train) does. Anchors and
/// observations are shared with the caller, not copied.
pub fn spawn(
    beacons: &Beacons,
    optimizer: GradientDescent<f64>,
    initial: Option<SolverState>,
) -> TrainingHandle {
    let beacons = beacons.clone();
    let (sender, progress) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let thread = thread::spawn(move || {
        let initial = initial.unwrap_or_else(|| beacons.initial_state(&mut rand::thread_rng()));
        debug!(?initial, "training worker started");
        beacons.fit_from_with(&optimizer, initial, |entry| {
            if flag.load(Ordering::Relaxed) || sender.send(entry).is_err() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    });

    TrainingHandle {
        progress,
        cancelled,
        thread,
    }
}
