use approx::assert_relative_eq;
use core::ops::ControlFlow;

use nalgebra::{Matrix3x2, OVector, Vector2, Vector3, U0, U2, U3};

use super::test_helpers::{line, MockCall, MockProblem};
use super::{Failure, GradientDescent, Snapshot};

#[test]
fn single_step_update() {
    #[rustfmt::skip]
    let jacobian = Matrix3x2::new(
        1., 0.,
        0., 1.,
        0., 0.,
    );
    let problem = MockProblem::<U2, U3>::new(
        Vector2::new(1., 2.),
        vec![Some(Vector3::new(1., 0., 0.)), Some(Vector3::zeros())],
        vec![Some(jacobian)],
    );
    let (mut problem, report) = GradientDescent::new()
        .with_learning_rate(0.25)
        .with_epochs(1)
        .minimize(problem);
    assert!(report.was_successful());
    assert_eq!(report.epochs, 1);
    assert_eq!(report.objective_function, 0.);
    // theta - 0.25 * 2 * J^T r
    assert_eq!(problem.set_params_history, vec![Vector2::new(0.5, 2.)]);
    assert_eq!(
        problem.calls(),
        [
            MockCall::Params,
            MockCall::Residuals,
            MockCall::Jacobian,
            MockCall::SetParams,
            MockCall::Residuals,
        ]
        .as_ref()
    );
}

#[test]
fn zero_epochs_leave_params_untouched() {
    let problem = MockProblem::<U2, U3>::new(
        Vector2::new(-3., 4.),
        vec![Some(Vector3::new(1., 2., 2.))],
        vec![],
    );
    let (mut problem, report) = GradientDescent::new().with_epochs(0).minimize(problem);
    assert!(report.was_successful());
    assert_eq!(report.epochs, 0);
    assert_eq!(report.objective_function, 9.);
    assert_eq!(*problem.current(), Vector2::new(-3., 4.));
    assert_eq!(
        problem.calls(),
        [MockCall::Params, MockCall::Residuals].as_ref()
    );
}

#[test]
fn missing_residuals() {
    let problem = MockProblem::<U2, U3>::new(Vector2::zeros(), vec![None], vec![]);
    let (mut problem, report) = GradientDescent::new().minimize(problem);
    assert_eq!(report.failure, Some(Failure::Residuals { epoch: 0 }));
    assert_eq!(report.epochs, 0);
    assert_eq!(
        problem.calls(),
        [MockCall::Params, MockCall::Residuals].as_ref()
    );
}

#[test]
fn missing_jacobian() {
    let problem = MockProblem::<U2, U3>::new(
        Vector2::zeros(),
        vec![Some(Vector3::new(1., 1., 1.))],
        vec![None],
    );
    let (mut problem, report) = GradientDescent::new().minimize(problem);
    assert_eq!(report.failure, Some(Failure::Jacobian { epoch: 0 }));
    assert_eq!(report.objective_function, 3.);
    assert!(problem.set_params_history.is_empty());
    assert_eq!(
        problem.calls(),
        [MockCall::Params, MockCall::Residuals, MockCall::Jacobian].as_ref()
    );
}

#[test]
fn missing_residuals_after_last_epoch() {
    let problem = MockProblem::<U2, U3>::new(
        Vector2::new(1., 2.),
        vec![Some(Vector3::new(1., 0., 0.)), None],
        vec![Some(Matrix3x2::identity())],
    );
    let (mut problem, report) = GradientDescent::new()
        .with_learning_rate(0.25)
        .with_epochs(1)
        .minimize(problem);
    assert_eq!(report.failure, Some(Failure::Residuals { epoch: 1 }));
    assert_eq!(report.epochs, 1);
    assert_eq!(problem.set_params_history, vec![Vector2::new(0.5, 2.)]);
    assert_eq!(
        problem.calls(),
        [
            MockCall::Params,
            MockCall::Residuals,
            MockCall::Jacobian,
            MockCall::SetParams,
            MockCall::Residuals,
        ]
        .as_ref()
    );
}

#[test]
fn nan_or_inf_residuals() {
    let problem = MockProblem::<U2, U3>::new(
        Vector2::zeros(),
        vec![Some(Vector3::new(1., f64::NAN, 0.))],
        vec![],
    );
    let (_, report) = GradientDescent::new().minimize(problem);
    assert_eq!(report.failure, Some(Failure::Numerical { epoch: 0 }));
    assert!(report.objective_function.is_nan());

    let problem = MockProblem::<U2, U3>::new(
        Vector2::zeros(),
        vec![Some(Vector3::new(1., f64::INFINITY, 0.))],
        vec![],
    );
    let (_, report) = GradientDescent::new().minimize(problem);
    assert_eq!(report.failure, Some(Failure::Numerical { epoch: 0 }));
    assert_eq!(report.objective_function, f64::INFINITY);
}

#[test]
fn no_parameters() {
    let problem = MockProblem::<U0, U3>::new(OVector::<f64, U0>::zeros(), vec![], vec![]);
    let (mut problem, report) = GradientDescent::new().minimize(problem);
    assert_eq!(report.failure, Some(Failure::NoParameters));
    assert_eq!(problem.calls(), [MockCall::Params].as_ref());
}

#[test]
fn fits_a_line() {
    let (problem, report) = GradientDescent::new().minimize(line(2., -1., Vector2::zeros()));
    assert!(report.was_successful());
    assert_eq!(report.epochs, 10_000);
    assert_relative_eq!(problem.params, Vector2::new(2., -1.), epsilon = 1e-6);
    assert!(report.objective_function < 1e-10);
}

#[test]
fn snapshots_follow_log_interval() {
    let mut snapshots: Vec<Snapshot<f64>> = vec![];
    let (_, report) = GradientDescent::new().with_epochs(50).minimize_with(
        line(1., 1., Vector2::zeros()),
        |snapshot| {
            snapshots.push(snapshot);
            ControlFlow::Continue(())
        },
    );
    assert!(report.was_successful());
    let epochs: Vec<usize> = snapshots.iter().map(|s| s.epoch).collect();
    assert_eq!(epochs, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);
    // convex problem with a small step: the loss never increases
    assert!(snapshots.windows(2).all(|w| w[1].loss <= w[0].loss));
    assert!(report.objective_function <= snapshots[9].loss);

    let mut count = 0;
    GradientDescent::new()
        .with_epochs(5)
        .minimize_with(line(1., 1., Vector2::zeros()), |_| {
            count += 1;
            ControlFlow::Continue(())
        });
    assert_eq!(count, 5);

    let mut count = 0;
    GradientDescent::new()
        .with_epochs(100)
        .with_log_interval(30)
        .minimize_with(line(1., 1., Vector2::zeros()), |_| {
            count += 1;
            ControlFlow::Continue(())
        });
    // epochs 0, 30, 60, 90
    assert_eq!(count, 4);
}

#[test]
fn cancellation_keeps_last_completed_epoch() {
    let (problem, report) = GradientDescent::new()
        .with_epochs(100)
        .with_log_interval(10)
        .minimize_with(line(1., 1., Vector2::zeros()), |snapshot| {
            if snapshot.epoch == 30 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
    assert_eq!(report.failure, Some(Failure::Cancelled { epoch: 30 }));
    assert_eq!(report.epochs, 30);
    assert_ne!(problem.params, Vector2::zeros());
}

#[test]
fn divergence_is_numerical_failure() {
    let (_, report) = GradientDescent::new()
        .with_learning_rate(1.)
        .with_epochs(2_000)
        .minimize(line(1., 1., Vector2::zeros()));
    assert!(matches!(report.failure, Some(Failure::Numerical { .. })));
    assert!(report.epochs < 2_000);
}

#[test]
fn default_configuration() {
    let gd = GradientDescent::<f64>::default();
    assert_eq!(gd.learning_rate(), 0.0005);
    assert_eq!(gd.epochs(), 10_000);
    assert_eq!(gd.log_interval(), 1_000);
    assert_eq!(gd.with_epochs(0).log_interval(), 1);
}

#[test]
#[should_panic(expected = "learning rate must be > 0")]
fn rejects_non_positive_learning_rate() {
    let _ = GradientDescent::new().with_learning_rate(0.);
}

#[test]
#[should_panic(expected = "log interval must be > 0")]
fn rejects_zero_log_interval() {
    let _ = GradientDescent::<f64>::new().with_log_interval(0);
}
