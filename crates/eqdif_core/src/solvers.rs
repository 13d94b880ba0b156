use crate::error::{Result, SimulationError};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numerical scheme used to compute the next value vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationMethod {
    Euler,
    #[serde(rename = "runge-kutta-4", alias = "rk4")]
    RungeKutta4,
}

impl fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationMethod::Euler => f.write_str("euler"),
            IntegrationMethod::RungeKutta4 => f.write_str("runge-kutta-4"),
        }
    }
}

impl FromStr for IntegrationMethod {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(IntegrationMethod::Euler),
            "rk4" | "runge-kutta-4" | "runge_kutta_4" => Ok(IntegrationMethod::RungeKutta4),
            other => Err(SimulationError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Computes the values of every variable after a step of `dt`.
///
/// The result always has `system.dimension()` entries, each clamped to the
/// range of its variable. A `current` vector of another length is rejected.
pub fn compute_next_step<T, S>(
    system: &S,
    current: &[T],
    dt: T,
    method: IntegrationMethod,
) -> Result<Vec<T>>
where
    T: Scalar,
    S: DynamicalSystem<T> + ?Sized,
{
    let dim = system.dimension();
    if current.len() != dim {
        return Err(SimulationError::DimensionMismatch {
            expected_what: "variables",
            expected: dim,
            found_what: "values",
            found: current.len(),
        });
    }

    let next = match method {
        IntegrationMethod::Euler => euler(system, current, dt),
        IntegrationMethod::RungeKutta4 => runge_kutta_4(system, current, dt),
    };
    Ok(next)
}

// https://en.wikipedia.org/wiki/Euler_method
fn euler<T, S>(system: &S, current: &[T], dt: T) -> Vec<T>
where
    T: Scalar,
    S: DynamicalSystem<T> + ?Sized,
{
    (0..current.len())
        .map(|i| {
            let derivative = system.derivative(i, current);
            system.clamp(i, current[i] + derivative * dt)
        })
        .collect()
}

/// Runge-Kutta 4 applied one variable at a time.
///
/// Each variable is advanced on its own: the stages only perturb the variable
/// being integrated while the others keep their current value, and every stage
/// (including the last one) is sampled half a step ahead. This is not the
/// coupled vector RK4; trajectories produced with it are expected to match this
/// exact scheme.
fn runge_kutta_4<T, S>(system: &S, current: &[T], dt: T) -> Vec<T>
where
    T: Scalar,
    S: DynamicalSystem<T> + ?Sized,
{
    let two = T::one() + T::one();
    let half = T::one() / two;
    let six = two + two + two;

    let mut work = current.to_vec();
    let mut next = Vec::with_capacity(current.len());

    for i in 0..current.len() {
        let x = current[i];

        // k1 = dt * f_i(x)
        let k1 = dt * system.derivative(i, &work);

        // k2 = dt * f_i(x with x_i + k1/2)
        work[i] = x + k1 * half;
        let k2 = dt * system.derivative(i, &work);

        // k3 = dt * f_i(x with x_i + k2/2)
        work[i] = x + k2 * half;
        let k3 = dt * system.derivative(i, &work);

        // k4 = dt * f_i(x with x_i + k3/2)
        work[i] = x + k3 * half;
        let k4 = dt * system.derivative(i, &work);

        work[i] = x;

        next.push(system.clamp(i, x + (k1 + two * k2 + two * k3 + k4) / six));
    }

    next
}
