use crate::LeastSquaresProblem;
use core::ops::ControlFlow;
use nalgebra::{allocator::Allocator, convert, DefaultAllocator, Dim, RealField, Vector};
use tracing::{trace, warn};

#[cfg(test)]
mod test_descent;

/// Learning rate used by [`GradientDescent::new`].
pub const DEFAULT_LEARNING_RATE: f64 = 0.0005;

/// Number of epochs used by [`GradientDescent::new`].
pub const DEFAULT_EPOCHS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reasons for aborting the minimization.
pub enum Failure {
    /// The residuals could not be computed at the current parameters.
    Residuals { epoch: usize },
    /// The Jacobian could not be computed at the current parameters.
    Jacobian { epoch: usize },
    /// Encountered `NaN` or `$\pm\infty$` in the loss or the parameters.
    Numerical { epoch: usize },
    /// The progress callback asked to stop.
    Cancelled { epoch: usize },
    /// The number of parameters `$n$` is zero.
    NoParameters,
}

/// Loss value handed to the progress callback every `log_interval` epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot<F> {
    /// Zero-based epoch the loss was evaluated at, before its update.
    pub epoch: usize,
    /// Sum of squared residuals `$E$`.
    pub loss: F,
}

#[derive(Debug, Clone)]
/// Information about the minimization.
///
/// Use this to inspect the run. Most importantly you may want to check
/// if there was a failure. Running out of epochs is not a failure.
pub struct MinimizationReport<F: RealField> {
    pub failure: Option<Failure>,
    /// Number of completed parameter updates.
    pub epochs: usize,
    /// Contains the value of `$E(\vec{\theta})$` at the returned parameters.
    pub objective_function: F,
}

impl<F: RealField> MinimizationReport<F> {
    pub fn was_successful(&self) -> bool {
        self.failure.is_none()
    }
}

/// Helper to keep target and report about it together.
struct TargetReport<F: RealField, O> {
    target: O,
    report: MinimizationReport<F>,
}

impl<F: RealField, O> TargetReport<F, O> {
    fn failure(self, failure: Failure) -> (O, MinimizationReport<F>) {
        warn!(?failure, epochs = self.report.epochs, "gradient descent aborted");
        (
            self.target,
            MinimizationReport {
                failure: Some(failure),
                ..self.report
            },
        )
    }

    fn success(self) -> (O, MinimizationReport<F>) {
        (self.target, self.report)
    }
}

/// Fixed-epoch batch gradient descent.
///
/// Every epoch evaluates the residuals, the Jacobian and updates all
/// parameters with
/// ```math
///   \vec{\theta} \gets \vec{\theta} - \eta\,\nabla E(\vec{\theta}),
///   \quad \nabla E = 2\mathbf{J}^\top\vec{r}.
/// ```
/// There is no momentum, no adaptive step and no line search. The loop
/// always runs the full epoch budget; it does not test for convergence.
/// For non-convex problems it can therefore stop far from an optimum,
/// settle in a local minimum, oscillate, or diverge when the learning rate
/// `$\eta$` is too large. Divergence to a non-finite loss is reported as
/// [`Failure::Numerical`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GradientDescent<F> {
    learning_rate: F,
    epochs: usize,
    log_interval: Option<usize>,
}

impl<F: RealField + Copy> GradientDescent<F> {
    pub fn new() -> Self {
        Self {
            learning_rate: convert(DEFAULT_LEARNING_RATE),
            epochs: DEFAULT_EPOCHS,
            log_interval: None,
        }
    }

    /// Set the step size `$\eta$`.
    ///
    /// # Panics
    ///
    /// Panics if `$\eta \leq 0$` or if it is not finite.
    pub fn with_learning_rate(self, learning_rate: F) -> Self {
        assert!(
            learning_rate > F::zero() && learning_rate.is_finite(),
            "learning rate must be > 0"
        );
        Self {
            learning_rate,
            ..self
        }
    }

    /// Set the number of parameter updates. Zero epochs leaves the
    /// parameters untouched.
    pub fn with_epochs(self, epochs: usize) -> Self {
        Self { epochs, ..self }
    }

    /// Set how often the progress callback is invoked.
    ///
    /// Defaults to a tenth of the epoch budget.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn with_log_interval(self, interval: usize) -> Self {
        assert!(interval > 0, "log interval must be > 0");
        Self {
            log_interval: Some(interval),
            ..self
        }
    }

    pub fn learning_rate(&self) -> F {
        self.learning_rate
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    /// The effective snapshot interval.
    pub fn log_interval(&self) -> usize {
        self.log_interval.unwrap_or((self.epochs / 10).max(1))
    }

    /// Run gradient descent starting from the parameters stored in `target`.
    pub fn minimize<M, N, O>(&self, target: O) -> (O, MinimizationReport<F>)
    where
        M: Dim,
        N: Dim,
        O: LeastSquaresProblem<F, M, N>,
        DefaultAllocator: Allocator<N>,
    {
        self.minimize_with(target, |_| ControlFlow::Continue(()))
    }

    /// Like [`minimize`](#method.minimize) but reports a [`Snapshot`] every
    /// [`log_interval`](#method.log_interval) epochs, starting at epoch zero.
    ///
    /// Returning `ControlFlow::Break(())` from `progress` stops the run with
    /// [`Failure::Cancelled`]; the parameters of the last completed epoch stay
    /// in the returned problem.
    pub fn minimize_with<M, N, O, C>(&self, target: O, mut progress: C) -> (O, MinimizationReport<F>)
    where
        M: Dim,
        N: Dim,
        O: LeastSquaresProblem<F, M, N>,
        C: FnMut(Snapshot<F>) -> ControlFlow<()>,
        DefaultAllocator: Allocator<N>,
    {
        let mut report = TargetReport {
            target,
            report: MinimizationReport {
                failure: None,
                epochs: 0,
                objective_function: F::zero(),
            },
        };

        let mut theta: Vector<F, N, O::ParameterStorage> = report.target.params();
        if theta.nrows() == 0 {
            return report.failure(Failure::NoParameters);
        }

        let interval = self.log_interval();
        let two: F = convert(2.0);
        let step = -self.learning_rate * two;
        for epoch in 0..self.epochs {
            let residuals = if let Some(residuals) = report.target.residuals() {
                residuals
            } else {
                return report.failure(Failure::Residuals { epoch });
            };
            let loss = residuals.norm_squared();
            report.report.objective_function = loss;
            if !loss.is_finite() {
                return report.failure(Failure::Numerical { epoch });
            }

            if epoch % interval == 0 {
                trace!(epoch, ?loss, "snapshot");
                if progress(Snapshot { epoch, loss }).is_break() {
                    return report.failure(Failure::Cancelled { epoch });
                }
            }

            let jacobian = if let Some(jacobian) = report.target.jacobian() {
                jacobian
            } else {
                return report.failure(Failure::Jacobian { epoch });
            };

            // theta - eta * 2 J^T r
            let gradient = jacobian.tr_mul(&residuals);
            theta.axpy(step, &gradient, F::one());
            if !theta.iter().all(|p| p.is_finite()) {
                return report.failure(Failure::Numerical { epoch });
            }
            report.target.set_params(&theta);
            report.report.epochs = epoch + 1;
        }

        // Loss at the returned parameters
        let epoch = report.report.epochs;
        let residuals = if let Some(residuals) = report.target.residuals() {
            residuals
        } else {
            return report.failure(Failure::Residuals { epoch });
        };
        report.report.objective_function = residuals.norm_squared();
        if !report.report.objective_function.is_finite() {
            return report.failure(Failure::Numerical { epoch });
        }
        report.success()
    }
}

impl<F: RealField + Copy> Default for GradientDescent<F> {
    fn default() -> Self {
        Self::new()
    }
}
