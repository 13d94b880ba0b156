/// The `eqdif_core` crate simulates systems of polynomial differential equations.
/// A system is a set of bounded variables, each driven by a sum of terms of the form
/// `coefficient * x_i^e_i * x_j^e_j ...`, stepped forward by a fixed-step integrator and,
/// optionally, on a background thread paced to a desired framerate.
///
/// Key components:
/// - **System**: `EquationSystem` (variables, ranges, equations) and its validation.
/// - **Equation Engine**: A small parser turning `0.9*prey - 0.2*prey*predator` into terms.
/// - **Solvers**: Explicit Euler and the per-variable Runge-Kutta 4 scheme.
/// - **Simulation**: Value history, step/reset observers, binary snapshots.
/// - **Launcher**: Start/pause/resume/stop state machine driving any `Process`.
pub mod equation_engine;
pub mod error;
pub mod launcher;
pub mod presets;
pub mod safety;
pub mod simulation;
pub mod snapshot;
pub mod solvers;
pub mod system;
pub mod time;
pub mod traits;

pub use error::{Result, SimulationError};
