use crate::config::{ModelFile, RunConfig};
use anyhow::{bail, Context, Result};
use clap::Args;
use eqdif_core::launcher::{Launcher, LauncherSettings, State};
use eqdif_core::presets::{self, PRESETS};
use eqdif_core::simulation::Simulation;
use eqdif_core::solvers::IntegrationMethod;
use eqdif_core::time::TimeUnit;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the simulated system comes from. Defaults to the first preset.
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct SourceArgs {
    /// Name of a built-in system (see `eqdif presets`)
    #[arg(long)]
    pub preset: Option<String>,

    /// JSON model file describing variables and equations
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Snapshot previously written with `--output`
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StepArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Integration method: euler or rk4
    #[arg(long, value_parser = parse_method)]
    pub method: Option<IntegrationMethod>,

    /// Number of steps to perform
    #[arg(long, default_value = "1")]
    pub count: usize,

    /// Simulated duration of one step
    #[arg(long)]
    pub step: Option<f64>,

    /// Unit of `--step`: ns, ms, s, min, h or d
    #[arg(long, value_parser = parse_unit)]
    pub unit: Option<TimeUnit>,

    /// Write a snapshot of the simulation to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// JSON run settings, overridden by the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Integration method: euler or rk4
    #[arg(long, value_parser = parse_method)]
    pub method: Option<IntegrationMethod>,

    /// Desired number of steps per second
    #[arg(long)]
    pub fps: Option<f64>,

    /// Simulated duration of one step
    #[arg(long)]
    pub step: Option<f64>,

    /// Unit of `--step`: ns, ms, s, min, h or d
    #[arg(long, value_parser = parse_unit)]
    pub unit: Option<TimeUnit>,

    /// Wall-clock duration of the run, in milliseconds
    #[arg(long, default_value = "1000")]
    pub duration_ms: u64,

    /// Pause the run halfway for this many milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,

    /// Write a snapshot of the simulation to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_method(value: &str) -> std::result::Result<IntegrationMethod, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_unit(value: &str) -> std::result::Result<TimeUnit, String> {
    value.parse().map_err(|err| format!("{err}"))
}

/// Builds the simulation selected by `source`. `method` overrides the one
/// stored in a snapshot; other sources default to Euler.
pub fn open_simulation(source: &SourceArgs, method: Option<IntegrationMethod>) -> Result<Simulation> {
    if let Some(path) = &source.input {
        let mut simulation = Simulation::open(path)
            .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        if let Some(method) = method {
            simulation.set_method(method);
        }
        return Ok(simulation);
    }

    let method = method.unwrap_or(IntegrationMethod::Euler);
    if let Some(path) = &source.model {
        let system = ModelFile::load(path)?
            .into_system()
            .with_context(|| format!("Invalid model in {}", path.display()))?;
        return Ok(Simulation::new(system, method)?);
    }

    let name = source.preset.as_deref().unwrap_or(PRESETS[0]);
    Simulation::from_preset(name, method)
        .with_context(|| format!("Failed to create preset '{name}'"))
}

pub fn list_presets() -> Result<()> {
    for name in PRESETS {
        let system = presets::preset(name)?;
        println!("{:<16}{}", name, system.names().join(", "));
    }
    Ok(())
}

pub fn show(source: &SourceArgs) -> Result<()> {
    let simulation = open_simulation(source, None)?;
    print!("{}", describe(&simulation));
    Ok(())
}

fn describe(simulation: &Simulation) -> String {
    let system = simulation.system();
    let names = system.names();
    let current = simulation.current();

    let mut out = format!(
        "method: {}, steps: {}\n",
        simulation.method(),
        simulation.history().len() - 1
    );
    for (variable, equation) in system.variables().iter().zip(system.equations()) {
        out.push_str(&format!(
            "{} in [{}, {}] = {} (initial {})\n  d{}/dt = {}\n",
            variable.name,
            variable.range.min,
            variable.range.max,
            current.get(variable.index).copied().unwrap_or(f64::NAN),
            variable.initial_value,
            variable.name,
            equation.display(&names),
        ));
    }
    out
}

pub fn step(args: &StepArgs) -> Result<()> {
    let simulation = open_simulation(&args.source, args.method)?;
    let defaults = LauncherSettings::default();
    let settings = LauncherSettings {
        step: args.step.unwrap_or(defaults.step),
        unit: args.unit.unwrap_or(defaults.unit),
        ..defaults
    };

    let launcher = Launcher::new(simulation, settings);
    for _ in 0..args.count {
        if !launcher.step() {
            bail!("Launcher refused to step in state {}", launcher.state());
        }
    }

    let summary = launcher
        .perform_operation(describe)
        .context("Failed to describe the simulation")?;
    print!("{summary}");

    if let Some(path) = &args.output {
        save(&launcher, path)?;
    }
    Ok(())
}

/// Merges the optional config file with the command line flags, flags winning.
pub fn resolve_run_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    if let Some(fps) = args.fps {
        config.launcher.fps = fps;
    }
    if let Some(step) = args.step {
        config.launcher.step = step;
    }
    if let Some(unit) = args.unit {
        config.launcher.unit = unit;
    }
    if args.method.is_some() {
        config.method = args.method;
    }
    Ok(config)
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = resolve_run_config(args)?;
    let simulation = open_simulation(&args.source, config.method)?;

    let launcher = Launcher::new(simulation, config.launcher);
    launcher
        .configure(|simulation| {
            simulation.connect_step(|values| debug!("values: {:?}", values));
        })
        .context("Failed to attach step observer")?;

    if !launcher.start() {
        bail!("Failed to start the simulation");
    }

    let duration = Duration::from_millis(args.duration_ms);
    match args.pause_ms {
        Some(pause_ms) => {
            thread::sleep(duration / 2);
            if launcher.pause() {
                wait_for_state(&launcher, State::Paused);
                thread::sleep(Duration::from_millis(pause_ms));
                launcher.resume();
            }
            thread::sleep(duration - duration / 2);
        }
        None => thread::sleep(duration),
    }

    launcher.stop();

    let steps = launcher
        .perform_operation(|simulation| simulation.history().len() - 1)
        .context("Failed to inspect the simulation")?;
    info!(
        "Performed {} step(s) covering {}s of simulated time",
        steps,
        launcher.elapsed(TimeUnit::Second)
    );

    let summary = launcher
        .perform_operation(describe)
        .context("Failed to describe the simulation")?;
    print!("{summary}");

    if let Some(path) = &args.output {
        save(&launcher, path)?;
    }
    Ok(())
}

fn save(launcher: &Launcher<Simulation>, path: &Path) -> Result<()> {
    launcher
        .perform_operation(|simulation| simulation.save(path))
        .context("Saving the simulation panicked")?
        .with_context(|| format!("Failed to save simulation to {}", path.display()))
}

fn wait_for_state(launcher: &Launcher<Simulation>, state: State) {
    for _ in 0..1000 {
        if launcher.state() == state {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    warn!("Launcher did not reach state {} in time", state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn step_args(source: SourceArgs) -> StepArgs {
        StepArgs {
            source,
            method: None,
            count: 1,
            step: Some(1.0),
            unit: Some(TimeUnit::Second),
            output: None,
        }
    }

    fn run_args() -> RunArgs {
        RunArgs {
            source: SourceArgs::default(),
            config: None,
            method: None,
            fps: None,
            step: None,
            unit: None,
            duration_ms: 50,
            pause_ms: None,
            output: None,
        }
    }

    #[test]
    fn default_source_is_the_first_preset() {
        let simulation = open_simulation(&SourceArgs::default(), None).unwrap();
        assert_eq!(simulation.variable_names(), vec!["food", "pop", "industrial", "pollution"]);
        assert_eq!(simulation.method(), IntegrationMethod::Euler);
    }

    #[test]
    fn unknown_preset_fails() {
        let source = SourceArgs {
            preset: Some("weather".to_string()),
            ..SourceArgs::default()
        };
        assert!(open_simulation(&source, None).is_err());
    }

    #[test]
    fn step_output_can_be_reopened() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prey.snapshot");

        let mut args = step_args(SourceArgs {
            preset: Some("prey-predator".to_string()),
            ..SourceArgs::default()
        });
        args.output = Some(path.clone());
        step(&args).unwrap();

        let source = SourceArgs {
            input: Some(path),
            ..SourceArgs::default()
        };
        let reopened = open_simulation(&source, Some(IntegrationMethod::RungeKutta4)).unwrap();
        assert_eq!(reopened.history().len(), 2);
        assert_eq!(reopened.current(), &[25.5, 3.5]);
        assert_eq!(reopened.method(), IntegrationMethod::RungeKutta4);
    }

    #[test]
    fn model_source_is_parsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decay.json");
        fs::write(
            &path,
            r#"{ "variables": [ { "name": "x", "initial": 8, "equation": "-0.5*x" } ] }"#,
        )
        .unwrap();

        let source = SourceArgs {
            model: Some(path),
            ..SourceArgs::default()
        };
        let mut simulation = open_simulation(&source, None).unwrap();
        assert_eq!(simulation.step(1.0).unwrap(), &[4.0]);
        assert!(describe(&simulation).contains("dx/dt = -0.5*x"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{ "launcher": { "fps": 30, "step": 2, "unit": "second" }, "method": "euler" }"#,
        )
        .unwrap();

        let mut args = run_args();
        args.config = Some(path);
        args.fps = Some(120.0);
        args.method = Some(IntegrationMethod::RungeKutta4);

        let config = resolve_run_config(&args).unwrap();
        assert_eq!(config.launcher.fps, 120.0);
        assert_eq!(config.launcher.step, 2.0);
        assert_eq!(config.launcher.unit, TimeUnit::Second);
        assert_eq!(config.method, Some(IntegrationMethod::RungeKutta4));
    }

    #[test]
    fn short_run_with_pause_saves_progress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.snapshot");

        let mut args = run_args();
        args.source.preset = Some("dummy".to_string());
        args.fps = Some(500.0);
        args.pause_ms = Some(10);
        args.output = Some(path.clone());
        run(&args).unwrap();

        let simulation = Simulation::open(&path).unwrap();
        assert!(simulation.history().len() > 1);
    }

    #[test]
    fn method_and_unit_parsers() {
        assert_eq!(parse_method("rk4"), Ok(IntegrationMethod::RungeKutta4));
        assert!(parse_method("verlet").is_err());
        assert_eq!(parse_unit("ms"), Ok(TimeUnit::Millisecond));
        assert!(parse_unit("fortnight").is_err());
    }
}
