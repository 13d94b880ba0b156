use crate::error::{Result, SimulationError};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Admissible values of a variable. Invariant: `min < max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `[0, f64::MAX]`, the range used by all built-in systems.
    pub fn positive() -> Self {
        Self::new(0.0, f64::MAX)
    }

    /// Finite bounds with `min < max`.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// A factor `x[variable] ^ exponent` of a term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub variable: usize,
    pub exponent: f64,
}

impl Dependency {
    pub fn new(variable: usize, exponent: f64) -> Self {
        Self { variable, exponent }
    }

    /// Linear dependency on `variable`.
    pub fn on(variable: usize) -> Self {
        Self::new(variable, 1.0)
    }
}

/// `coefficient * Π x[dep.variable] ^ dep.exponent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub coefficient: f64,
    pub dependencies: Vec<Dependency>,
}

impl Term {
    pub fn new(coefficient: f64, dependencies: Vec<Dependency>) -> Self {
        Self {
            coefficient,
            dependencies,
        }
    }

    pub fn constant(coefficient: f64) -> Self {
        Self::new(coefficient, Vec::new())
    }

    pub fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
        self.dependencies
            .iter()
            .fold(to_scalar::<T>(self.coefficient), |acc, dep| {
                let value = x[dep.variable];
                // Integer exponents go through `powi` so that negative values
                // raised to whole powers stay finite.
                let factor = if dep.exponent == 1.0 {
                    value
                } else if dep.exponent.fract() == 0.0 && dep.exponent.abs() <= i32::MAX as f64 {
                    value.powi(dep.exponent as i32)
                } else {
                    value.powf(to_scalar::<T>(dep.exponent))
                };
                acc * factor
            })
    }
}

/// Derivative rule of one variable: the sum of its terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    /// Bookkeeping only; every equation is first order.
    pub order: u32,
    pub terms: Vec<Term>,
}

impl Equation {
    pub fn new(terms: Vec<Term>) -> Self {
        Self { order: 1, terms }
    }

    pub fn evaluate<T: Scalar>(&self, x: &[T]) -> T {
        self.terms
            .iter()
            .fold(T::zero(), |acc, term| acc + term.evaluate(x))
    }
}

impl Default for Equation {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub index: usize,
    pub initial_value: f64,
    pub range: Range,
}

/// A set of variables along with the equations describing their evolution.
///
/// Equation `i` is the time-derivative of variable `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationSystem {
    variables: Vec<Variable>,
    equations: Vec<Equation>,
}

impl EquationSystem {
    /// Builds and validates a system.
    pub fn new(variables: Vec<Variable>, equations: Vec<Equation>) -> Result<Self> {
        let system = Self {
            variables,
            equations,
        };
        system.validate()?;
        Ok(system)
    }

    /// Builds a system from the parallel containers used on disk. Any length
    /// mismatch between them is a configuration error.
    pub fn from_parts(
        names: Vec<String>,
        initial_values: Vec<f64>,
        ranges: Vec<Range>,
        equations: Vec<Equation>,
    ) -> Result<Self> {
        check_len("variables", names.len(), "values", initial_values.len())?;
        check_len("variables", names.len(), "ranges", ranges.len())?;
        check_len("variables", names.len(), "equations", equations.len())?;

        let variables = names
            .into_iter()
            .zip(initial_values)
            .zip(ranges)
            .enumerate()
            .map(|(index, ((name, initial_value), range))| Variable {
                name,
                index,
                initial_value,
                range,
            })
            .collect();

        Self::new(variables, equations)
    }

    /// Checks the structural invariants of the system.
    pub fn validate(&self) -> Result<()> {
        let count = self.variables.len();
        check_len("variables", count, "equations", self.equations.len())?;

        for (position, variable) in self.variables.iter().enumerate() {
            if variable.index != position {
                return Err(SimulationError::DimensionMismatch {
                    expected_what: "variable index",
                    expected: position,
                    found_what: "declared index",
                    found: variable.index,
                });
            }
            if !variable.range.is_valid() {
                return Err(SimulationError::InvalidRange {
                    variable: variable.name.clone(),
                    min: variable.range.min,
                    max: variable.range.max,
                });
            }
        }

        for (variable, equation) in self.variables.iter().zip(&self.equations) {
            let out_of_bounds = equation
                .terms
                .iter()
                .flat_map(|term| term.dependencies.iter())
                .find(|dep| dep.variable >= count);
            if let Some(dep) = out_of_bounds {
                return Err(SimulationError::DependencyOutOfBounds {
                    variable: variable.name.clone(),
                    index: dep.variable,
                    count,
                });
            }
        }

        Ok(())
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn equations(&self) -> &[Equation] {
        &self.equations
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.initial_value).collect()
    }

    pub fn ranges(&self) -> Vec<Range> {
        self.variables.iter().map(|v| v.range).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }
}

impl<T: Scalar> DynamicalSystem<T> for EquationSystem {
    fn dimension(&self) -> usize {
        self.variables.len()
    }

    fn derivative(&self, index: usize, x: &[T]) -> T {
        self.equations[index].evaluate(x)
    }

    fn clamp(&self, index: usize, value: T) -> T {
        let range = self.variables[index].range;
        let lo = to_scalar::<T>(range.min);
        let hi = to_scalar::<T>(range.max);
        // `max`/`min` on floats also bring NaN back into the range.
        value.max(lo).min(hi)
    }
}

fn check_len(
    expected_what: &'static str,
    expected: usize,
    found_what: &'static str,
    found: usize,
) -> Result<()> {
    if expected != found {
        return Err(SimulationError::DimensionMismatch {
            expected_what,
            expected,
            found_what,
            found,
        });
    }
    Ok(())
}

/// Values that do not fit in `T` saturate to infinity of the right sign.
fn to_scalar<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(|| {
        if value.is_sign_negative() {
            T::neg_infinity()
        } else {
            T::infinity()
        }
    })
}
