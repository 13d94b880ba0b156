//! Error types for the eqdif core.
//!
//! Every configuration problem (inconsistent system, bad range, unknown method,
//! unreadable snapshot) is reported as a [`SimulationError`]. Launcher misuse is
//! not an error: it is logged and ignored.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// Two parallel containers describing the system disagree in length.
    #[error("Mismatch between defined {expected_what} and {found_what}: found {expected} {expected_what} but {found} {found_what}")]
    DimensionMismatch {
        expected_what: &'static str,
        expected: usize,
        found_what: &'static str,
        found: usize,
    },
    /// A variable range does not satisfy `min < max`.
    #[error("Invalid range configured for variable {variable}: {min} - {max}")]
    InvalidRange { variable: String, min: f64, max: f64 },
    /// A term of an equation references a variable that does not exist.
    #[error("Dependency for variable {variable} requires variable {index} when only {count} are available")]
    DependencyOutOfBounds {
        variable: String,
        index: usize,
        count: usize,
    },
    /// The simulation has no value vector at all.
    #[error("Simulation history is empty")]
    EmptyHistory,
    /// A step entry of the history has the wrong length.
    #[error("Step {step} defines {found} value(s) but {expected} variable(s) are defined")]
    HistoryShape {
        step: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unsupported integration method: {0}")]
    UnsupportedMethod(String),
    #[error("Unsupported time unit: {0}")]
    UnsupportedUnit(String),
    /// The integrator produced a vector of the wrong length.
    #[error("Failed to generate values for all {expected} variable(s) for step {step}: only {found} value(s) were generated")]
    StepShape {
        step: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown variable '{0}' in equation")]
    UnknownVariable(String),
    #[error("Failed to parse equation: {0}")]
    Parse(String),
    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { expected: u32, found: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, SimulationError>;
