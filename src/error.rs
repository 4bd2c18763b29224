//! Error types of the beacon solver.
use thiserror::Error;

/// Rejected inputs. Raised before any training starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    /// The anchor set is empty
    #[error("at least one anchor is required")]
    NoAnchors,

    /// Observed distances are not index-aligned with the anchors
    #[error("expected {anchors} observed distances, got {observations}")]
    LengthMismatch { anchors: usize, observations: usize },

    /// Residual terms for synthesized observations are not index-aligned
    #[error("expected {anchors} residual terms, got {residuals}")]
    ResidualLengthMismatch { anchors: usize, residuals: usize },

    /// Every anchor sits on the same point
    #[error("all anchors coincide; the receiver position is not observable")]
    DegenerateAnchors,

    /// NaN or infinity in coordinates, distances or biases
    #[error("input contains a non-finite value")]
    NonFinite,

    /// Anchors spread so wide that the sampling box overflows
    #[error("anchor coordinates span more than the floating point range")]
    OutOfRange,

    /// Parameter sheet without the five expected rows
    #[error("parameter sheet must have 5 rows, found {0}")]
    SheetRows(usize),

    /// Parameter sheet row of the wrong width
    #[error("parameter sheet row {row} must have {expected} values, found {found}")]
    SheetRowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Fatal conditions that abort a training run.
///
/// Running out of epochs far from the optimum is not an error; inspect the
/// training log or the returned loss instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    /// The candidate position lies on an anchor, where the range gradient is undefined
    #[error("candidate ({x}, {y}) coincides with anchor {anchor} at epoch {epoch}")]
    CoincidentWithAnchor {
        epoch: usize,
        anchor: usize,
        x: f64,
        y: f64,
    },

    /// Loss or state became non-finite, usually from a too large learning rate
    #[error("training diverged at epoch {epoch}; lower the learning rate")]
    Diverged { epoch: usize },

    /// Stopped on request of the caller
    #[error("training cancelled at epoch {epoch}")]
    Cancelled { epoch: usize },

    /// The background training thread panicked
    #[error("training worker panicked")]
    WorkerPanicked,
}
