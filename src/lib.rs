//! Range-based localization of a 2D receiver with a shared clock bias,
//! fitted by batch [gradient descent](https://en.wikipedia.org/wiki/Gradient_descent)
//! on top of [nalgebra](https://nalgebra.org).
//!
//! Given anchors `$\vec{a}_1,\ldots,\vec{a}_m\in\R^2$` (beacons) and observed
//! ranges `$o_1,\ldots,o_m$`, the receiver position `$(x, y)$` and clock bias
//! `$\tau$` are found by minimizing
//! ```math
//!   E(x, y, \tau) = \sum_{i=1}^m \bigl(o_i - p_i\bigr)^2,\quad
//!   p_i = \bigl\|\vec{a}_i - (x, y)^\top\bigr\| + \tau.
//! ```
//!
//! # Model
//!
//! With `$d_i = \|\vec{a}_i - (x, y)^\top\|$` the analytic gradient is
//! ```math
//!   \frac{\partial E}{\partial x} = \sum_i -2(o_i - p_i)\,\frac{-(a_{i,x} - x)}{d_i},\quad
//!   \frac{\partial E}{\partial y} = \sum_i -2(o_i - p_i)\,\frac{-(a_{i,y} - y)}{d_i},\quad
//!   \frac{\partial E}{\partial \tau} = \sum_i -2(o_i - p_i).
//! ```
//! It is undefined on an anchor (`$d_i = 0$`). Training refuses such a
//! starting point and aborts with [`TrainError::CoincidentWithAnchor`] if an
//! iterate lands on one.
//!
//! A per-anchor residual term `$r_i$` can be added when synthesizing
//! observations. A constant residual shifts all ranges exactly like `$\tau$`
//! does, so the two cannot be told apart and only `$\tau$` is fitted.
//!
//! # Optimizer
//!
//! [`GradientDescent`] works on any [`LeastSquaresProblem`]: plain
//! fixed-epoch steps `$\vec{\theta}\gets\vec{\theta}-\eta\nabla E$` with no
//! convergence test. The loss is not convex; a run can end in a spurious
//! minimum or, with a large `$\eta$`, diverge ([`TrainError::Diverged`]).
//!
//! # Usage Example
//!
//! ```
//! use beacon_locator::{Beacons, GradientDescent, SolverState};
//! use nalgebra::Point2;
//!
//! let anchors = vec![
//!     Point2::new(0., 0.),
//!     Point2::new(10., 0.),
//!     Point2::new(0., 10.),
//! ];
//! let beacons = Beacons::simulate(anchors, Point2::new(3., 4.), 0., &[]).unwrap();
//!
//! let fit = beacons
//!     .fit_from(&GradientDescent::new(), SolverState::new(1., 1., 0.5))
//!     .unwrap();
//! assert!((fit.state.x - 3.).abs() < 1e-3);
//! assert!((fit.state.y - 4.).abs() < 1e-3);
//! assert!(fit.mean_squared_error() < 1e-6);
//! ```
//!
//! Long runs can be moved off the calling thread with [`worker::spawn`],
//! which streams [`LogEntry`] snapshots and supports cancellation.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: `info` when a run starts and ends,
//! `debug` for every log snapshot, `warn` when the optimizer aborts.
//! Installing a subscriber is up to the application.

mod beacons;
mod error;
mod gd;
pub mod params;
mod problem;
mod training_log;
mod utils;
pub mod worker;

pub use beacons::{BeaconProblem, Beacons, BoundingBox, Fit, SolverState};
pub use error::{ConstructionError, TrainError};
pub use gd::{
    Failure, GradientDescent, MinimizationReport, Snapshot, DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE,
};
pub use params::ParameterSheet;
pub use problem::LeastSquaresProblem;
pub use training_log::{LogEntry, TrainingLog};

pub use utils::differentiate_numerically;
