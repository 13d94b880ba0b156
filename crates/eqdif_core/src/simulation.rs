use crate::error::{Result, SimulationError};
use crate::presets;
use crate::snapshot::Snapshot;
use crate::solvers::{compute_next_step, IntegrationMethod};
use crate::system::EquationSystem;
use crate::time::{TimeTracker, TimeUnit};
use crate::traits::{DynamicalSystem, Process};
use std::path::Path;
use tracing::{debug, info, trace};

/// Callback receiving a value vector (new step or reset values).
pub type Observer = Box<dyn FnMut(&[f64]) + Send>;

/// Handle returned when attaching an observer, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
struct Observers {
    next_id: u64,
    step: Vec<(ObserverId, Observer)>,
    reset: Vec<(ObserverId, Observer)>,
}

impl Observers {
    fn allocate(&mut self) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        id
    }

    fn emit(list: &mut [(ObserverId, Observer)], values: &[f64]) {
        for (_, observer) in list.iter_mut() {
            observer(values);
        }
    }
}

/// An equation system integrated forward in time, along with every value
/// vector it went through.
///
/// The first history entry is always the initial values of the system.
pub struct Simulation {
    method: IntegrationMethod,
    system: EquationSystem,
    values: Vec<Vec<f64>>,
    observers: Observers,
}

impl Simulation {
    pub fn new(system: EquationSystem, method: IntegrationMethod) -> Result<Self> {
        let values = vec![system.initial_values()];
        let simulation = Self {
            method,
            system,
            values,
            observers: Observers::default(),
        };
        simulation.validate()?;

        info!(
            "Created {} simulation with {} variable(s)",
            simulation.method,
            simulation.system.variables().len()
        );
        Ok(simulation)
    }

    pub fn from_preset(name: &str, method: IntegrationMethod) -> Result<Self> {
        Self::new(presets::preset(name)?, method)
    }

    /// Builds a simulation from a snapshot file, keeping its history.
    pub fn open(path: &Path) -> Result<Self> {
        let (system, method, values) = Snapshot::load(path)?.into_parts()?;
        let mut simulation = Self::new(system, method)?;
        if !values.is_empty() {
            simulation.values = values;
        }
        simulation.validate()?;
        Ok(simulation)
    }

    /// Replaces the system and the history with the content of `path`.
    ///
    /// The simulation is left untouched when the file is invalid. On success the
    /// reset observers receive the latest loaded values.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let (system, method, values) = Snapshot::load(path)?.into_parts()?;
        let values = if values.is_empty() {
            vec![system.initial_values()]
        } else {
            values
        };
        validate_history(&system, &values)?;

        self.system = system;
        self.method = method;
        self.values = values;

        if let Some(latest) = self.values.last() {
            Observers::emit(&mut self.observers.reset, latest);
        }

        info!(
            "Loaded simulation with {} variable(s) and {} simulation step(s) from {}",
            self.system.variables().len(),
            self.values.len(),
            path.display()
        );
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Snapshot::new(&self.system, self.method, &self.values).save(path)?;
        info!(
            "Saved simulation with {} variable(s) and {} simulation step(s) to {}",
            self.system.variables().len(),
            self.values.len(),
            path.display()
        );
        Ok(())
    }

    /// Brings every variable back to its initial value and drops the history.
    pub fn reset(&mut self) -> Result<()> {
        info!(
            "Reset {} variable(s) to their initial value, discarding {} existing simulation step(s)",
            self.system.variables().len(),
            self.values.len()
        );

        self.values = vec![self.system.initial_values()];
        self.validate()?;

        Observers::emit(&mut self.observers.reset, &self.values[0]);
        Ok(())
    }

    /// Checks that the system and the history are consistent.
    pub fn validate(&self) -> Result<()> {
        validate_history(&self.system, &self.values)
    }

    /// Computes the next value vector for a step of `dt` seconds and appends it.
    pub fn step(&mut self, dt: f64) -> Result<&[f64]> {
        let step = self.values.len();
        let current = self.values.last().ok_or(SimulationError::EmptyHistory)?;

        let next = compute_next_step(&self.system, current, dt, self.method)?;
        let expected = DynamicalSystem::<f64>::dimension(&self.system);
        if next.len() != expected {
            return Err(SimulationError::StepShape {
                step,
                expected,
                found: next.len(),
            });
        }

        trace!("Generated {} value(s) for step {}", next.len(), step);

        self.values.push(next);
        let latest = &self.values[step];
        Observers::emit(&mut self.observers.step, latest);
        Ok(latest)
    }

    /// Attaches an observer called with every new value vector, on the thread
    /// advancing the simulation.
    pub fn connect_step(&mut self, observer: impl FnMut(&[f64]) + Send + 'static) -> ObserverId {
        let id = self.observers.allocate();
        self.observers.step.push((id, Box::new(observer)));
        id
    }

    /// Attaches an observer called with the initial values after each reset.
    pub fn connect_reset(&mut self, observer: impl FnMut(&[f64]) + Send + 'static) -> ObserverId {
        let id = self.observers.allocate();
        self.observers.reset.push((id, Box::new(observer)));
        id
    }

    /// Detaches an observer; returns whether it was attached.
    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        let before = self.observers.step.len() + self.observers.reset.len();
        self.observers.step.retain(|(candidate, _)| *candidate != id);
        self.observers.reset.retain(|(candidate, _)| *candidate != id);
        before != self.observers.step.len() + self.observers.reset.len()
    }

    pub fn disconnect_all(&mut self) {
        let count = self.observers.step.len() + self.observers.reset.len();
        self.observers.step.clear();
        self.observers.reset.clear();
        if count > 0 {
            debug!("Disconnected {} observer(s)", count);
        }
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    pub fn set_method(&mut self, method: IntegrationMethod) {
        if method != self.method {
            debug!("Switching integration method from {} to {}", self.method, method);
            self.method = method;
        }
    }

    pub fn system(&self) -> &EquationSystem {
        &self.system
    }

    pub fn history(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Latest value vector.
    pub fn current(&self) -> &[f64] {
        // Never empty once validated.
        self.values.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.system.names()
    }
}

impl Process for Simulation {
    fn advance(&mut self, time: &TimeTracker) -> anyhow::Result<()> {
        let dt = time.last_step_duration(TimeUnit::Second);
        self.step(dt)?;
        trace!(
            "Step {} lasted {}ms of simulated time",
            self.values.len() - 1,
            time.last_step_duration(TimeUnit::Millisecond)
        );
        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

fn validate_history(system: &EquationSystem, values: &[Vec<f64>]) -> Result<()> {
    system.validate()?;

    if values.is_empty() {
        return Err(SimulationError::EmptyHistory);
    }
    let expected = system.variables().len();
    if let Some((step, found)) = values
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|&(_, len)| len != expected)
    {
        return Err(SimulationError::HistoryShape {
            step,
            expected,
            found,
        });
    }
    Ok(())
}
