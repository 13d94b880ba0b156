//! Built-in equation systems.

use crate::error::{Result, SimulationError};
use crate::system::{Dependency, Equation, EquationSystem, Range, Term};

/// Names accepted by [`preset`], the first one being the default.
pub const PRESETS: [&str; 3] = ["world", "prey-predator", "dummy"];

pub fn preset(name: &str) -> Result<EquationSystem> {
    match name {
        "world" => world(),
        "prey-predator" => prey_predator(),
        "dummy" => dummy(10),
        other => Err(SimulationError::UnknownPreset(other.to_string())),
    }
}

struct Builder {
    names: Vec<String>,
    initial_values: Vec<f64>,
    ranges: Vec<Range>,
    equations: Vec<Equation>,
}

impl Builder {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            initial_values: Vec::new(),
            ranges: Vec::new(),
            equations: Vec::new(),
        }
    }

    fn variable(mut self, name: &str, initial_value: f64, terms: Vec<Term>) -> Self {
        self.names.push(name.to_string());
        self.initial_values.push(initial_value);
        self.ranges.push(Range::positive());
        self.equations.push(Equation::new(terms));
        self
    }

    fn build(self) -> Result<EquationSystem> {
        EquationSystem::from_parts(self.names, self.initial_values, self.ranges, self.equations)
    }
}

/// Lotka-Volterra: https://en.wikipedia.org/wiki/Lotka%E2%80%93Volterra_equations
pub fn prey_predator() -> Result<EquationSystem> {
    const PREY: usize = 0;
    const PREDATOR: usize = 1;

    let alpha = 0.9;
    let beta = 0.2;
    let delta = 0.2;
    let gamma = 0.5;

    Builder::new()
        .variable(
            "prey",
            15.0,
            vec![
                Term::new(alpha, vec![Dependency::on(PREY)]),
                Term::new(-beta, vec![Dependency::on(PREY), Dependency::on(PREDATOR)]),
            ],
        )
        .variable(
            "predator",
            1.0,
            vec![
                Term::new(delta, vec![Dependency::on(PREY), Dependency::on(PREDATOR)]),
                Term::new(-gamma, vec![Dependency::on(PREDATOR)]),
            ],
        )
        .build()
}

/// Food, population, industry and pollution feeding into each other.
pub fn world() -> Result<EquationSystem> {
    const FOOD: usize = 0;
    const POP: usize = 1;
    const INDUSTRIAL_PROD: usize = 2;
    const POLLUTION: usize = 3;

    let crop_yield = 0.04;
    let appetite = -0.1;
    let environmental_damage = -0.01;

    let mortality_rate = -0.01;
    let birth_rate = 0.015;
    let pollution_mortality = -0.05;

    let productivity = 0.4;
    let industry_depreciation = -0.001;
    let maintenance_cost = -0.09;

    let pollution_rate = 0.05;
    let purge_rate = -0.05;

    Builder::new()
        .variable(
            "food",
            10.0,
            vec![
                Term::new(crop_yield, vec![Dependency::on(INDUSTRIAL_PROD)]),
                Term::new(appetite, vec![Dependency::on(POP)]),
                Term::new(environmental_damage, vec![Dependency::on(POLLUTION)]),
            ],
        )
        .variable(
            "pop",
            1.0,
            vec![
                Term::new(mortality_rate, vec![Dependency::on(POP)]),
                Term::new(birth_rate, vec![Dependency::on(POP), Dependency::on(FOOD)]),
                Term::new(pollution_mortality, vec![Dependency::on(POLLUTION)]),
            ],
        )
        .variable(
            "industrial",
            0.0,
            vec![
                Term::new(industry_depreciation, vec![Dependency::on(INDUSTRIAL_PROD)]),
                Term::new(productivity, vec![Dependency::on(POP)]),
                Term::new(maintenance_cost, vec![Dependency::on(POLLUTION)]),
            ],
        )
        .variable(
            "pollution",
            0.0,
            vec![
                Term::new(pollution_rate, vec![Dependency::on(INDUSTRIAL_PROD)]),
                Term::constant(purge_rate),
            ],
        )
        .build()
}

/// `count` independent variables growing exponentially.
pub fn dummy(count: usize) -> Result<EquationSystem> {
    let mut builder = Builder::new();
    for id in 0..count {
        let name = format!("haha_{id}");
        builder = builder.variable(
            &name,
            0.2 * (id as f64 + 1.0),
            vec![Term::new(1.0, vec![Dependency::on(id)])],
        );
    }
    builder.build()
}
