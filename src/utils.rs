use crate::LeastSquaresProblem;
use nalgebra::{allocator::Allocator, convert, DefaultAllocator, Dim, OMatrix, RealField};
use num_traits::float::Float;

/// Compute a [numerical approximation](https://en.wikipedia.org/wiki/Numerical_differentiation)
/// of the Jacobian at the parameters currently stored in `problem`.
///
/// Uses central differences with a step of `$\sqrt[3]{\epsilon}\max(|\theta_j|, 1)$`
/// per parameter. The stored parameters are restored before returning.
///
/// The function is intended to be used for debugging or testing your
/// [`LeastSquaresProblem::jacobian`](trait.LeastSquaresProblem.html#tymethod.jacobian)
/// implementation. Numerical derivatives are less precise than the floating
/// point type, so compare with a tolerance around `$10^{-6}$` for `f64`.
///
/// Returns `None` if the residuals are undefined at one of the sampled points.
pub fn differentiate_numerically<F, M, N, O>(problem: &mut O) -> Option<OMatrix<F, M, N>>
where
    F: RealField + Float,
    M: Dim,
    N: Dim,
    O: LeastSquaresProblem<F, M, N>,
    DefaultAllocator: Allocator<M, N>,
{
    let params = problem.params();
    let residuals = problem.residuals()?;
    let (m, n) = (residuals.shape_generic().0, params.shape_generic().0);
    let mut jacobian = OMatrix::<F, M, N>::zeros_generic(m, n);
    let two: F = convert(2.);
    let cbrt_eps = Float::cbrt(<F as Float>::epsilon());

    let mut shifted = params.clone();
    for j in 0..params.nrows() {
        let h = cbrt_eps * Float::max(Float::abs(params[j]), F::one());
        shifted[j] = params[j] + h;
        problem.set_params(&shifted);
        let forward = problem.residuals();
        shifted[j] = params[j] - h;
        problem.set_params(&shifted);
        let backward = problem.residuals();
        shifted[j] = params[j];

        let (forward, backward) = match (forward, backward) {
            (Some(forward), Some(backward)) => (forward, backward),
            _ => {
                problem.set_params(&params);
                return None;
            }
        };
        for i in 0..forward.nrows() {
            jacobian[(i, j)] = (forward[i] - backward[i]) / (two * h);
        }
    }
    problem.set_params(&params);
    Some(jacobian)
}
