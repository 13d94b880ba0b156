use crate::time::TimeTracker;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our equation systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a system of first-order differential equations `dx/dt = f(x)`.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the time-derivative of the variable at `index` for the state `x`.
    fn derivative(&self, index: usize, x: &[T]) -> T;

    /// Evaluates the whole vector field into `out`.
    fn apply(&self, x: &[T], out: &mut [T]) {
        for (index, slot) in out.iter_mut().enumerate().take(self.dimension()) {
            *slot = self.derivative(index, x);
        }
    }

    /// Clamps a freshly integrated value of the variable at `index` to its
    /// admissible range. Unbounded systems keep the value as is.
    fn clamp(&self, _index: usize, value: T) -> T {
        value
    }
}

/// Something the launcher can drive forward in time.
///
/// `advance` is called once per simulation step with the time tracker that was
/// just incremented by the step duration. Errors are reported to the caller,
/// which logs them and carries on with the next step.
pub trait Process {
    fn advance(&mut self, time: &TimeTracker) -> anyhow::Result<()>;
}
