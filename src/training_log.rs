use core::fmt;

use crate::SolverState;

/// One `(epoch, mean squared error)` snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub epoch: usize,
    pub mse: f64,
}

/// Append-only record of a training run.
///
/// Snapshots are pushed while the optimizer runs; the fitted state is
/// recorded once at the end. The `Display` impl renders one line per
/// snapshot followed by the summary line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingLog {
    entries: Vec<LogEntry>,
    summary: Option<SolverState>,
}

impl TrainingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, epoch: usize, mse: f64) {
        debug_assert!(self.summary.is_none(), "log is already finished");
        self.entries.push(LogEntry { epoch, mse });
    }

    pub fn finish(&mut self, fitted: SolverState) {
        self.summary = Some(fitted);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The fitted state, if the run completed.
    pub fn summary(&self) -> Option<&SolverState> {
        self.summary.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.summary.is_none()
    }
}

impl fmt::Display for TrainingLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "epoch: {}, error: {}", entry.epoch, entry.mse)?;
        }
        if let Some(fitted) = &self.summary {
            writeln!(f, "X={}, Y={}, tau={}", fitted.x, fitted.y, fitted.tau)?;
        }
        Ok(())
    }
}
