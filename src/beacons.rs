use core::ops::ControlFlow;
use std::sync::Arc;

use nalgebra::{storage::Owned, Const, DVector, Dyn, OMatrix, Point2, Vector3, U3};
use rand::Rng;
use tracing::{debug, info};

use crate::{
    ConstructionError, Failure, GradientDescent, LeastSquaresProblem, LogEntry, TrainError,
    TrainingLog,
};

/// Distances below this are treated as the candidate sitting on an anchor.
const MIN_DISTANCE: f64 = f64::MIN_POSITIVE;

/// Receiver position and clock bias being fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverState {
    pub x: f64,
    pub y: f64,
    /// Clock bias added to every predicted range.
    pub tau: f64,
}

impl SolverState {
    pub fn new(x: f64, y: f64, tau: f64) -> Self {
        Self { x, y, tau }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.tau)
    }

    pub fn from_vector(theta: &Vector3<f64>) -> Self {
        Self::new(theta.x, theta.y, theta.z)
    }
}

impl From<SolverState> for (f64, f64, f64) {
    fn from(state: SolverState) -> Self {
        (state.x, state.y, state.tau)
    }
}

/// Largest absolute anchor coordinates, `(max|x|, max|y|)`.
///
/// Only used to scale the random initial guess.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn of(anchors: &[Point2<f64>]) -> Self {
        anchors.iter().fold(
            Self {
                max_x: 0.,
                max_y: 0.,
            },
            |bounds, anchor| Self {
                max_x: bounds.max_x.max(anchor.x.abs()),
                max_y: bounds.max_y.max(anchor.y.abs()),
            },
        )
    }

    pub fn contains(&self, point: &Point2<f64>) -> bool {
        point.x.abs() <= self.max_x && point.y.abs() <= self.max_y
    }
}

/// Outcome of a completed training run.
#[derive(Debug, Clone)]
pub struct Fit {
    pub state: SolverState,
    /// Predicted range for every anchor at `state`, in anchor order.
    pub predicted: DVector<f64>,
    /// Sum of squared range residuals at `state`.
    pub loss: f64,
    pub epochs: usize,
    pub log: TrainingLog,
}

impl Fit {
    pub fn mean_squared_error(&self) -> f64 {
        self.loss / self.predicted.len() as f64
    }
}

/// Anchors with their observed ranges.
///
/// Anchors and observations are fixed at construction and index-aligned.
/// Both live behind an `Arc`, so clones are cheap and can be handed to
/// concurrent training runs while each run owns its own [`SolverState`].
///
/// The loss is non-convex in the receiver position. Depending on the
/// initial guess the descent can settle in a spurious minimum (typically
/// with a large negative clock bias) and nothing but the epoch budget stops
/// it. Check [`Fit::loss`] or the training log when the result matters.
#[derive(Debug, Clone)]
pub struct Beacons {
    anchors: Arc<[Point2<f64>]>,
    observed: Arc<DVector<f64>>,
    bounds: BoundingBox,
    receiver: Option<Point2<f64>>,
    log: TrainingLog,
}

impl Beacons {
    /// Anchors with directly measured ranges.
    pub fn new(anchors: Vec<Point2<f64>>, observed: Vec<f64>) -> Result<Self, ConstructionError> {
        validate_anchors(&anchors)?;
        if observed.len() != anchors.len() {
            return Err(ConstructionError::LengthMismatch {
                anchors: anchors.len(),
                observations: observed.len(),
            });
        }
        if !observed.iter().all(|d| d.is_finite()) {
            return Err(ConstructionError::NonFinite);
        }
        Ok(Self::from_parts(anchors, DVector::from_vec(observed), None))
    }

    /// Anchors with ranges synthesized from a known receiver.
    ///
    /// `observed_i = |anchor_i - receiver| + tau + residuals_i`. An empty
    /// `residuals` slice means no per-anchor error.
    pub fn simulate(
        anchors: Vec<Point2<f64>>,
        receiver: Point2<f64>,
        tau: f64,
        residuals: &[f64],
    ) -> Result<Self, ConstructionError> {
        validate_anchors(&anchors)?;
        if !residuals.is_empty() && residuals.len() != anchors.len() {
            return Err(ConstructionError::ResidualLengthMismatch {
                anchors: anchors.len(),
                residuals: residuals.len(),
            });
        }
        let finite = receiver.x.is_finite()
            && receiver.y.is_finite()
            && tau.is_finite()
            && residuals.iter().all(|r| r.is_finite());
        if !finite {
            return Err(ConstructionError::NonFinite);
        }
        let observed = DVector::from_iterator(
            anchors.len(),
            anchors.iter().enumerate().map(|(i, anchor)| {
                (anchor - receiver).norm() + tau + residuals.get(i).copied().unwrap_or(0.)
            }),
        );
        Ok(Self::from_parts(anchors, observed, Some(receiver)))
    }

    fn from_parts(
        anchors: Vec<Point2<f64>>,
        observed: DVector<f64>,
        receiver: Option<Point2<f64>>,
    ) -> Self {
        let bounds = BoundingBox::of(&anchors);
        debug!(
            anchors = anchors.len(),
            max_x = bounds.max_x,
            max_y = bounds.max_y,
            "beacons ready"
        );
        Self {
            anchors: anchors.into(),
            observed: Arc::new(observed),
            bounds,
            receiver,
            log: TrainingLog::new(),
        }
    }

    pub fn anchors(&self) -> &[Point2<f64>] {
        &self.anchors
    }

    pub fn observed(&self) -> &DVector<f64> {
        &self.observed
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The simulated receiver, replaced by the fitted position after a
    /// successful [`train`](#method.train).
    pub fn receiver(&self) -> Option<Point2<f64>> {
        self.receiver
    }

    /// Predicted range to every anchor: `|anchor_i - (x, y)| + tau`.
    pub fn predict(&self, state: &SolverState) -> DVector<f64> {
        let position = state.position();
        DVector::from_iterator(
            self.len(),
            self.anchors
                .iter()
                .map(|anchor| (anchor - position).norm() + state.tau),
        )
    }

    /// `$E = \sum_i (\mathrm{observed}_i - \mathrm{predicted}_i)^2$`.
    ///
    /// # Panics
    ///
    /// Panics if `predicted` does not have one entry per anchor.
    pub fn loss(&self, predicted: &DVector<f64>) -> f64 {
        assert_eq!(predicted.len(), self.len(), "one prediction per anchor");
        (&*self.observed - predicted).norm_squared()
    }

    /// [`loss`](#method.loss) divided by the number of anchors.
    pub fn mean_squared_error(&self, predicted: &DVector<f64>) -> f64 {
        self.loss(predicted) / self.len() as f64
    }

    /// Analytic gradient `$(\partial E/\partial x, \partial E/\partial y, \partial E/\partial\tau)$`
    /// at `state`, where `predicted` is `self.predict(state)`.
    ///
    /// Returns `None` if `state` sits on an anchor.
    pub fn gradient(&self, predicted: &DVector<f64>, state: &SolverState) -> Option<Vector3<f64>> {
        assert_eq!(predicted.len(), self.len(), "one prediction per anchor");
        let mut gradient = Vector3::zeros();
        for ((anchor, observed), predicted) in self
            .anchors
            .iter()
            .zip(self.observed.iter())
            .zip(predicted.iter())
        {
            let (dx, dy) = (anchor.x - state.x, anchor.y - state.y);
            let distance = dx.hypot(dy);
            if distance < MIN_DISTANCE {
                return None;
            }
            let de_dp = -2. * (observed - predicted);
            gradient.x += de_dp * (-dx / distance);
            gradient.y += de_dp * (-dy / distance);
            gradient.z += de_dp;
        }
        Some(gradient)
    }

    /// Index of the first anchor `state` coincides with.
    pub fn coincident_anchor(&self, state: &SolverState) -> Option<usize> {
        let position = state.position();
        self.anchors
            .iter()
            .position(|anchor| (anchor - position).norm() < MIN_DISTANCE)
    }

    /// Random starting point: `(x, y)` uniform in the bounding box and
    /// `tau` the sum of a clock term in `[0, 2)` and a residual term in `[0, 1)`.
    pub fn initial_state<R: Rng + ?Sized>(&self, rng: &mut R) -> SolverState {
        let BoundingBox { max_x, max_y } = self.bounds;
        SolverState::new(
            rng.gen_range(-max_x..=max_x),
            rng.gen_range(-max_y..=max_y),
            rng.gen_range(0.0..2.0) + rng.gen_range(0.0..1.0),
        )
    }

    /// The least squares view of these beacons, starting at `initial`.
    pub fn problem(&self, initial: SolverState) -> BeaconProblem<'_> {
        BeaconProblem {
            beacons: self,
            theta: initial.to_vector(),
        }
    }

    /// Train `epochs` epochs with the default learning rate from a random
    /// start and return the fitted `(x, y, tau)`.
    pub fn train(&mut self, epochs: usize) -> Result<SolverState, TrainError> {
        self.train_with(
            &GradientDescent::new().with_epochs(epochs),
            &mut rand::thread_rng(),
        )
        .map(|fit| fit.state)
    }

    /// Like [`train`](#method.train) with an explicit learning rate.
    ///
    /// # Panics
    ///
    /// Panics if `learning_rate` is not positive.
    pub fn train_with_learning_rate(
        &mut self,
        epochs: usize,
        learning_rate: f64,
    ) -> Result<SolverState, TrainError> {
        let optimizer = GradientDescent::new()
            .with_epochs(epochs)
            .with_learning_rate(learning_rate);
        self.train_with(&optimizer, &mut rand::thread_rng())
            .map(|fit| fit.state)
    }

    /// Train from a start drawn from `rng`.
    ///
    /// The run's log replaces the stored one even if training fails; on
    /// success the fitted position becomes [`receiver`](#method.receiver).
    pub fn train_with<R: Rng + ?Sized>(
        &mut self,
        optimizer: &GradientDescent<f64>,
        rng: &mut R,
    ) -> Result<Fit, TrainError> {
        let initial = self.initial_state(rng);
        let mut log = TrainingLog::new();
        let outcome = self.run(optimizer, initial, &mut log, |_| ControlFlow::Continue(()));
        self.log = log;
        let fit = outcome?;
        self.receiver = Some(fit.state.position());
        Ok(fit)
    }

    /// Train from an explicit start. Identical inputs give identical results.
    pub fn fit_from(
        &self,
        optimizer: &GradientDescent<f64>,
        initial: SolverState,
    ) -> Result<Fit, TrainError> {
        self.fit_from_with(optimizer, initial, |_| ControlFlow::Continue(()))
    }

    /// Like [`fit_from`](#method.fit_from), reporting every log snapshot to
    /// `progress`, which may cancel the run.
    pub fn fit_from_with<C>(
        &self,
        optimizer: &GradientDescent<f64>,
        initial: SolverState,
        progress: C,
    ) -> Result<Fit, TrainError>
    where
        C: FnMut(LogEntry) -> ControlFlow<()>,
    {
        self.run(optimizer, initial, &mut TrainingLog::new(), progress)
    }

    /// Text of the most recent [`train`](#method.train) run.
    pub fn train_logs(&self) -> String {
        self.log.to_string()
    }

    pub fn training_log(&self) -> &TrainingLog {
        &self.log
    }

    fn run<C>(
        &self,
        optimizer: &GradientDescent<f64>,
        initial: SolverState,
        log: &mut TrainingLog,
        mut progress: C,
    ) -> Result<Fit, TrainError>
    where
        C: FnMut(LogEntry) -> ControlFlow<()>,
    {
        if let Some(anchor) = self.coincident_anchor(&initial) {
            return Err(TrainError::CoincidentWithAnchor {
                epoch: 0,
                anchor,
                x: initial.x,
                y: initial.y,
            });
        }
        info!(
            anchors = self.len(),
            epochs = optimizer.epochs(),
            learning_rate = optimizer.learning_rate(),
            ?initial,
            "training started"
        );

        let count = self.len() as f64;
        let (problem, report) = optimizer.minimize_with(self.problem(initial), |snapshot| {
            let mse = snapshot.loss / count;
            debug!(epoch = snapshot.epoch, mse, "training progress");
            log.push(snapshot.epoch, mse);
            progress(LogEntry {
                epoch: snapshot.epoch,
                mse,
            })
        });
        let state = problem.state();

        match report.failure {
            None => {}
            Some(Failure::Residuals { epoch }) | Some(Failure::Jacobian { epoch }) => {
                return Err(match self.coincident_anchor(&state) {
                    Some(anchor) => TrainError::CoincidentWithAnchor {
                        epoch,
                        anchor,
                        x: state.x,
                        y: state.y,
                    },
                    None => TrainError::Diverged { epoch },
                });
            }
            Some(Failure::Numerical { epoch }) => return Err(TrainError::Diverged { epoch }),
            Some(Failure::Cancelled { epoch }) => return Err(TrainError::Cancelled { epoch }),
            Some(Failure::NoParameters) => unreachable!("beacon problems have three parameters"),
        }

        if let Some(anchor) = self.coincident_anchor(&state) {
            return Err(TrainError::CoincidentWithAnchor {
                epoch: report.epochs,
                anchor,
                x: state.x,
                y: state.y,
            });
        }

        let predicted = self.predict(&state);
        log.finish(state);
        info!(
            x = state.x,
            y = state.y,
            tau = state.tau,
            mse = report.objective_function / count,
            "training finished"
        );
        Ok(Fit {
            state,
            predicted,
            loss: report.objective_function,
            epochs: report.epochs,
            log: log.clone(),
        })
    }
}

fn validate_anchors(anchors: &[Point2<f64>]) -> Result<(), ConstructionError> {
    let first = anchors.first().ok_or(ConstructionError::NoAnchors)?;
    if !anchors.iter().all(|a| a.x.is_finite() && a.y.is_finite()) {
        return Err(ConstructionError::NonFinite);
    }
    if anchors.iter().all(|a| a == first) {
        return Err(ConstructionError::DegenerateAnchors);
    }
    // initial states are drawn from [-max, max] on each axis
    let BoundingBox { max_x, max_y } = BoundingBox::of(anchors);
    if !(2. * max_x).is_finite() || !(2. * max_y).is_finite() {
        return Err(ConstructionError::OutOfRange);
    }
    Ok(())
}

/// [`Beacons`] as a [`LeastSquaresProblem`] over `$\vec{\theta} = (x, y, \tau)$`.
///
/// Residuals are `observed - predicted`, so the Jacobian rows are
/// `((a_x - x)/d, (a_y - y)/d, -1)`. The Jacobian is undefined, and
/// `None` is returned, when the candidate sits on an anchor.
pub struct BeaconProblem<'a> {
    beacons: &'a Beacons,
    theta: Vector3<f64>,
}

impl BeaconProblem<'_> {
    pub fn state(&self) -> SolverState {
        SolverState::from_vector(&self.theta)
    }
}

impl LeastSquaresProblem<f64, Dyn, U3> for BeaconProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, theta: &Vector3<f64>) {
        self.theta.copy_from(theta);
    }

    fn params(&self) -> Vector3<f64> {
        self.theta
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.beacons.observed() - self.beacons.predict(&self.state()))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U3>> {
        let state = self.state();
        let mut jacobian =
            OMatrix::<f64, Dyn, U3>::zeros_generic(Dyn(self.beacons.len()), Const::<3>);
        for (i, anchor) in self.beacons.anchors().iter().enumerate() {
            let (dx, dy) = (anchor.x - state.x, anchor.y - state.y);
            let distance = dx.hypot(dy);
            if distance < MIN_DISTANCE {
                return None;
            }
            jacobian[(i, 0)] = dx / distance;
            jacobian[(i, 1)] = dy / distance;
            jacobian[(i, 2)] = -1.;
        }
        Some(jacobian)
    }
}
