//! Simulated time bookkeeping.

use crate::error::SimulationError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Default number of step durations remembered by a [`TimeTracker`].
pub const DEFAULT_FRAMES: usize = 10;

/// Common units for a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Nanosecond,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// How many seconds one unit lasts.
    pub fn in_seconds(self) -> f64 {
        match self {
            TimeUnit::Nanosecond => 1e-9,
            TimeUnit::Millisecond => 1e-3,
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 60.0 * 60.0,
            TimeUnit::Day => 60.0 * 60.0 * 24.0,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Nanosecond => "nanosecond",
            TimeUnit::Millisecond => "millisecond",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeUnit {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ns" | "nanosecond" | "nanoseconds" => Ok(TimeUnit::Nanosecond),
            "ms" | "millisecond" | "milliseconds" => Ok(TimeUnit::Millisecond),
            "s" | "second" | "seconds" => Ok(TimeUnit::Second),
            "min" | "minute" | "minutes" => Ok(TimeUnit::Minute),
            "h" | "hour" | "hours" => Ok(TimeUnit::Hour),
            "d" | "day" | "days" => Ok(TimeUnit::Day),
            other => Err(SimulationError::UnsupportedUnit(other.to_string())),
        }
    }
}

/// Linear conversion of `d` from `source` to `target`, through seconds.
pub fn convert_duration(d: f64, source: TimeUnit, target: TimeUnit) -> f64 {
    d * source.in_seconds() / target.in_seconds()
}

/// Accumulates the simulated time and remembers the last few step durations.
///
/// Not synchronized: the launcher keeps it behind its control lock.
#[derive(Debug, Clone)]
pub struct TimeTracker {
    unit: TimeUnit,
    elapsed: f64,
    capacity: usize,
    frames: VecDeque<(f64, TimeUnit)>,
}

impl TimeTracker {
    /// `origin` is expressed in `unit`, which is also the internal unit.
    pub fn new(origin: f64, unit: TimeUnit, capacity: usize) -> Self {
        Self {
            unit,
            elapsed: origin,
            capacity: capacity.max(1),
            frames: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn increment(&mut self, delta: f64, unit: TimeUnit) {
        self.record(delta, unit);
    }

    pub fn decrement(&mut self, delta: f64, unit: TimeUnit) {
        self.record(-delta, unit);
    }

    /// Duration of the most recent step in `unit`, zero before the first step.
    pub fn last_step_duration(&self, unit: TimeUnit) -> f64 {
        self.frames
            .back()
            .map(|&(d, source)| convert_duration(d, source, unit))
            .unwrap_or(0.0)
    }

    /// Time elapsed since the origin in `unit`.
    pub fn elapsed(&self, unit: TimeUnit) -> f64 {
        convert_duration(self.elapsed, self.unit, unit)
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Number of step durations currently remembered.
    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    fn record(&mut self, delta: f64, unit: TimeUnit) {
        let converted = convert_duration(delta, unit, self.unit);
        self.elapsed += converted;

        self.frames.push_back((converted, self.unit));
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }
}

impl Default for TimeTracker {
    fn default() -> Self {
        Self::new(0.0, TimeUnit::Second, DEFAULT_FRAMES)
    }
}
