//! Binary persistence of a simulation.
//!
//! A snapshot stores the system in the same parallel layout as the on-disk
//! model (names, initial values, ranges, equations) followed by the value
//! history. Encoding uses bincode, so floats round-trip bit for bit. The
//! layout is tied to [`SNAPSHOT_VERSION`] and carries no compatibility promise
//! beyond it.

use crate::error::{Result, SimulationError};
use crate::solvers::IntegrationMethod;
use crate::system::{Equation, EquationSystem, Range};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Snapshot format version (increment on breaking changes).
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub method: IntegrationMethod,
    pub names: Vec<String>,
    pub initial_values: Vec<f64>,
    pub ranges: Vec<Range>,
    pub equations: Vec<Equation>,
    pub values: Vec<Vec<f64>>,
}

impl Snapshot {
    pub fn new(system: &EquationSystem, method: IntegrationMethod, values: &[Vec<f64>]) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            method,
            names: system.names(),
            initial_values: system.initial_values(),
            ranges: system.ranges(),
            equations: system.equations().to_vec(),
            values: values.to_vec(),
        }
    }

    /// Rebuilds the validated system; the history is left to the caller.
    pub fn into_parts(self) -> Result<(EquationSystem, IntegrationMethod, Vec<Vec<f64>>)> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SimulationError::SnapshotVersion {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            });
        }
        let system =
            EquationSystem::from_parts(self.names, self.initial_values, self.ranges, self.equations)?;
        Ok((system, self.method, self.values))
    }

    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn read_from(reader: impl Read) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        debug!(
            "Wrote snapshot with {} variable(s) and {} step(s) to {}",
            self.names.len(),
            self.values.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot = Self::read_from(reader)?;
        debug!(
            "Read snapshot with {} variable(s) and {} step(s) from {}",
            snapshot.names.len(),
            snapshot.values.len(),
            path.display()
        );
        Ok(snapshot)
    }
}
