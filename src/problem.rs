use nalgebra::{
    storage::{IsContiguous, RawStorageMut, Storage},
    Dim, Matrix, RealField, Vector,
};

/// A least squares problem driven by [`GradientDescent`](struct.GradientDescent.html).
///
/// The problem owns its current parameters `$\vec{\theta}\in\R^n$` and
/// exposes the residual vector `$\vec{r}(\vec{\theta})\in\R^m$` together with
/// its Jacobian. The minimized loss is
/// ```math
///   E(\vec{\theta}) = \sum_{i=1}^m r_i(\vec{\theta})^2,
/// ```
/// so the gradient used by the optimizer is `$\nabla E = 2\mathbf{J}^\top\vec{r}$`.
///
/// Returning `None` from [`residuals`](#tymethod.residuals) or
/// [`jacobian`](#tymethod.jacobian) marks the current parameters as a point
/// where the model is not defined. The optimizer aborts instead of stepping
/// through it.
pub trait LeastSquaresProblem<F, M, N>
where
    F: RealField + Copy,
    M: Dim,
    N: Dim,
{
    /// Storage type used for the residuals. Use `nalgebra::storage::Owned<F, M>`
    /// if you want to use `OVector`.
    type ResidualStorage: RawStorageMut<F, M> + Storage<F, M> + IsContiguous;
    type JacobianStorage: RawStorageMut<F, M, N> + Storage<F, M, N> + IsContiguous;
    type ParameterStorage: RawStorageMut<F, N> + Storage<F, N> + IsContiguous + Clone;

    /// Set the stored parameters `$\vec{\theta}$`.
    fn set_params(&mut self, theta: &Vector<F, N, Self::ParameterStorage>);

    /// Get the current parameter vector `$\vec{\theta}$`.
    fn params(&self) -> Vector<F, N, Self::ParameterStorage>;

    /// Compute the residual vector `observed - predicted`.
    fn residuals(&self) -> Option<Vector<F, M, Self::ResidualStorage>>;

    /// Compute the Jacobian of the residual vector.
    fn jacobian(&self) -> Option<Matrix<F, M, N, Self::JacobianStorage>>;
}
