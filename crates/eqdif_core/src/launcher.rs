//! Background execution of a [`Process`].
//!
//! A [`Launcher`] owns one worker thread and a small state machine:
//!
//! ```text
//! None/Stopped --start()--> RunRequested --(worker)--> Running
//! Running      --pause()--> PauseRequested --(worker)--> Paused
//! Paused       --resume()--> ResumeRequested --(worker)--> Running
//! started      --stop()--> StopRequested --(worker)--> Stopped
//! ```
//!
//! Control calls only flip the state; the worker observes it, performs the
//! transition and, while running, advances the process at the desired
//! framerate. The state, the framerate, the thread handle and the time tracker
//! live behind a single control lock, released before any step runs or the
//! worker sleeps. The process itself sits behind its own lock, taken by the
//! worker for each step and by [`Launcher::perform_operation`], so outside
//! code never observes it mid-step.

use crate::safety::with_safety_net;
use crate::time::{TimeTracker, TimeUnit, DEFAULT_FRAMES};
use crate::traits::Process;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Steps finishing earlier than this before their deadline do not sleep, the
/// timer granularity would make us oversleep.
const MINIMUM_SLEEP: Duration = Duration::from_millis(3);

/// Polling period of the worker while there is nothing to do (e.g. paused).
const IDLE_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    None,
    RunRequested,
    Running,
    PauseRequested,
    Paused,
    ResumeRequested,
    StopRequested,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::None => "none",
            State::RunRequested => "run requested",
            State::Running => "running",
            State::PauseRequested => "pause requested",
            State::Paused => "paused",
            State::ResumeRequested => "resume requested",
            State::StopRequested => "stop requested",
            State::Stopped => "stopped",
        };
        write!(f, "\"{name}\"")
    }
}

impl State {
    /// States in which the process can be touched synchronously.
    fn is_idle(self) -> bool {
        matches!(self, State::None | State::Paused | State::Stopped)
    }
}

/// Pace of a launcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Desired number of steps per wall-clock second.
    pub fps: f64,
    /// Simulated duration of one step, in `unit`.
    pub step: f64,
    pub unit: TimeUnit,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            fps: 60.0,
            step: 50.0,
            unit: TimeUnit::Millisecond,
        }
    }
}

struct Control {
    state: State,
    fps: f64,
    thread: Option<JoinHandle<()>>,
    time: TimeTracker,
}

struct Shared<P> {
    control: Mutex<Control>,
    process: Mutex<P>,
    step: f64,
    unit: TimeUnit,
}

pub struct Launcher<P: Process + Send + 'static> {
    shared: Arc<Shared<P>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wall-clock duration of one frame, `None` when `fps` is not a usable rate
/// (non-positive, non-finite, or so small the frame does not fit a `Duration`).
fn frame_budget(fps: f64) -> Option<Duration> {
    if !(fps > 0.0 && fps.is_finite()) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

impl<P: Process + Send + 'static> Launcher<P> {
    pub fn new(process: P, settings: LauncherSettings) -> Self {
        let fps = if frame_budget(settings.fps).is_some() {
            settings.fps
        } else {
            let fallback = LauncherSettings::default().fps;
            warn!(
                "Invalid desired framerate {}, using {} instead",
                settings.fps, fallback
            );
            fallback
        };

        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: State::None,
                    fps,
                    thread: None,
                    time: TimeTracker::new(0.0, settings.unit, DEFAULT_FRAMES),
                }),
                process: Mutex::new(process),
                step: settings.step,
                unit: settings.unit,
            }),
        }
    }

    /// Current state. Only a snapshot: the worker may change it right after.
    pub fn state(&self) -> State {
        lock(&self.shared.control).state
    }

    pub fn desired_fps(&self) -> f64 {
        lock(&self.shared.control).fps
    }

    /// Simulated duration of one step.
    pub fn step_size(&self) -> (f64, TimeUnit) {
        (self.shared.step, self.shared.unit)
    }

    /// Simulated time elapsed since the origin.
    pub fn elapsed(&self, unit: TimeUnit) -> f64 {
        lock(&self.shared.control).time.elapsed(unit)
    }

    pub fn set_desired_framerate(&self, fps: f64) -> bool {
        if frame_budget(fps).is_none() {
            warn!("Failed to set desired framerate to {}: invalid value", fps);
            return false;
        }

        lock(&self.shared.control).fps = fps;
        info!("Setting desired framerate to {}", fps);
        true
    }

    /// Spawns the worker. Ignored unless the launcher is new or stopped.
    pub fn start(&self) -> bool {
        let mut control = lock(&self.shared.control);
        if !matches!(control.state, State::None | State::Stopped) {
            warn!("Failed to start the simulation: state is {}", control.state);
            return false;
        }

        let previous = control.state;
        control.state = State::RunRequested;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("eqdif-launcher".to_string())
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => {
                control.thread = Some(handle);
                info!("Starting simulation");
                true
            }
            Err(err) => {
                control.state = previous;
                error!("Failed to spawn simulation thread: {}", err);
                false
            }
        }
    }

    pub fn pause(&self) -> bool {
        let mut control = lock(&self.shared.control);
        if control.state != State::Running {
            warn!("Failed to pause the simulation: state is {}", control.state);
            return false;
        }
        control.state = State::PauseRequested;
        true
    }

    pub fn resume(&self) -> bool {
        let mut control = lock(&self.shared.control);
        if control.state != State::Paused {
            warn!("Failed to resume the simulation: state is {}", control.state);
            return false;
        }
        control.state = State::ResumeRequested;
        true
    }

    /// Asks the worker to terminate and waits for it.
    ///
    /// Returns once the thread has been joined.
    pub fn stop(&self) -> bool {
        let handle = {
            let mut control = lock(&self.shared.control);
            match control.thread.take() {
                Some(handle) => {
                    control.state = State::StopRequested;
                    handle
                }
                None => {
                    if control.state.is_idle() {
                        warn!("Failed to stop the simulation: not started");
                    } else {
                        error!(
                            "Failed to stop the simulation: unexpected state {}",
                            control.state
                        );
                    }
                    return false;
                }
            }
        };

        let joined = handle.join();

        let mut control = lock(&self.shared.control);
        if joined.is_err() {
            error!("Simulation thread terminated abnormally");
            control.state = State::Stopped;
        } else if control.state != State::Stopped {
            error!(
                "Failed to stop the simulation: reached unexpected state {}",
                control.state
            );
        }
        true
    }

    /// Advances the process once, synchronously. Rejected while the worker is
    /// running so that two steps never overlap.
    pub fn step(&self) -> bool {
        let mut control = lock(&self.shared.control);
        if !control.state.is_idle() {
            warn!(
                "Failed to simulate a single step: unexpected simulation state {}",
                control.state
            );
            return false;
        }

        info!("Performing single simulation step");
        control.time.increment(self.shared.step, self.shared.unit);
        let time = control.time.clone();
        let fps = control.fps;

        // The control lock stays held: the worker cannot resume meanwhile.
        self.shared.cycle(&time, fps, false);
        true
    }

    /// Runs `op` on the process while no step is in progress.
    ///
    /// Returns `None` when `op` panicked.
    pub fn perform_operation<R>(&self, op: impl FnOnce(&P) -> R) -> Option<R> {
        let process = lock(&self.shared.process);
        with_safety_net("perform_operation", || Ok(op(&process)))
    }

    /// Runs `op` with mutable access to the process. Only allowed while the
    /// launcher is not running (new, paused or stopped).
    pub fn configure<R>(&self, op: impl FnOnce(&mut P) -> R) -> Option<R> {
        let control = lock(&self.shared.control);
        if !control.state.is_idle() {
            warn!(
                "Failed to configure the simulation: unexpected simulation state {}",
                control.state
            );
            return None;
        }

        let mut process = lock(&self.shared.process);
        let result = with_safety_net("configure", || Ok(op(&mut process)));
        drop(process);
        drop(control);
        result
    }
}

impl<P: Process + Send + 'static> Drop for Launcher<P> {
    fn drop(&mut self) {
        let started = lock(&self.shared.control).thread.is_some();
        if started {
            self.stop();
        }
    }
}

impl<P: Process> Shared<P> {
    /// Body of the worker thread.
    fn run(&self) {
        {
            let mut control = lock(&self.control);
            if control.state == State::RunRequested {
                control.state = State::Running;
            }
        }

        loop {
            let mut control = lock(&self.control);
            let state = control.state;
            match state {
                State::PauseRequested => {
                    info!("Pausing simulation");
                    control.state = State::Paused;
                }
                State::ResumeRequested => {
                    info!("Resuming simulation");
                    control.state = State::Running;
                }
                State::StopRequested => {
                    info!("Stopping simulation");
                    control.state = State::Stopped;
                    break;
                }
                State::Running => {
                    control.time.increment(self.step, self.unit);
                    let time = control.time.clone();
                    let fps = control.fps;
                    drop(control);

                    self.cycle(&time, fps, true);
                }
                _ => {
                    drop(control);
                    thread::sleep(IDLE_POLL);
                }
            }
        }
    }

    /// Advances the process once and, when `sleep` is set, waits for the rest
    /// of the frame budget.
    fn cycle(&self, time: &TimeTracker, fps: f64, sleep: bool) {
        let start = Instant::now();
        {
            let mut process = lock(&self.process);
            with_safety_net("advance", || process.advance(time));
        }
        let spent = start.elapsed();

        // Rates are validated when set.
        let expected = frame_budget(fps).unwrap_or(Duration::MAX);
        if spent > expected {
            warn!(
                "Took {:.3}ms to compute frame, expected {:.3}ms",
                spent.as_secs_f64() * 1000.0,
                expected.as_secs_f64() * 1000.0
            );
            return;
        }

        let remaining = expected - spent;
        if sleep && remaining > MINIMUM_SLEEP {
            thread::sleep(remaining);
        } else {
            debug!("Frame computed in {:?}, not sleeping", spent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Simulation;
    use crate::solvers::IntegrationMethod;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Counter {
        steps: Arc<AtomicUsize>,
        panic: bool,
        delay: Duration,
        dropped: Arc<AtomicBool>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                steps: Arc::new(AtomicUsize::new(0)),
                panic: false,
                delay: Duration::ZERO,
                dropped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Process for Counter {
        fn advance(&mut self, _time: &TimeTracker) -> anyhow::Result<()> {
            self.steps.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.panic {
                panic!("advance failed");
            }
            Ok(())
        }
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn fast() -> LauncherSettings {
        LauncherSettings {
            fps: 1000.0,
            step: 1.0,
            unit: TimeUnit::Second,
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn wait_for_state<P: Process + Send + 'static>(launcher: &Launcher<P>, state: State) -> bool {
        wait_for(|| launcher.state() == state)
    }

    #[test]
    fn start_pause_resume_stop() {
        let sim = Simulation::from_preset("prey-predator", IntegrationMethod::Euler).unwrap();
        let launcher = Launcher::new(sim, fast());
        assert_eq!(launcher.state(), State::None);

        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));

        assert!(launcher.pause());
        assert!(wait_for_state(&launcher, State::Paused));

        assert!(launcher.resume());
        assert!(wait_for_state(&launcher, State::Running));

        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);

        let steps = launcher.perform_operation(|sim| sim.history().len()).unwrap();
        assert!(steps > 1);
    }

    #[test]
    fn restart_after_stop() {
        let counter = Counter::new();
        let steps = Arc::clone(&counter.steps);
        let launcher = Launcher::new(counter, fast());

        assert!(launcher.start());
        assert!(wait_for(|| steps.load(Ordering::SeqCst) > 0));
        assert!(launcher.stop());

        let before = steps.load(Ordering::SeqCst);
        assert!(launcher.start());
        assert!(wait_for(|| steps.load(Ordering::SeqCst) > before));
        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);
    }

    #[test]
    fn misuse_is_ignored() {
        let launcher = Launcher::new(Counter::new(), fast());
        assert!(!launcher.stop());
        assert!(!launcher.pause());
        assert!(!launcher.resume());
        assert_eq!(launcher.state(), State::None);

        assert!(launcher.start());
        assert!(!launcher.start());
        assert!(wait_for_state(&launcher, State::Running));
        assert!(!launcher.resume());
        assert!(launcher.stop());
    }

    #[test]
    fn step_runs_synchronously_when_idle() {
        let counter = Counter::new();
        let steps = Arc::clone(&counter.steps);
        let launcher = Launcher::new(
            counter,
            LauncherSettings {
                fps: 60.0,
                step: 0.5,
                unit: TimeUnit::Second,
            },
        );

        for _ in 0..3 {
            assert!(launcher.step());
        }
        assert_eq!(steps.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.state(), State::None);
        assert!((launcher.elapsed(TimeUnit::Second) - 1.5).abs() < 1e-12);
        assert!((launcher.elapsed(TimeUnit::Millisecond) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn step_is_rejected_while_running() {
        let counter = Counter::new();
        let steps = Arc::clone(&counter.steps);
        // One frame per second: after its first step the worker sleeps.
        let launcher = Launcher::new(
            counter,
            LauncherSettings {
                fps: 1.0,
                step: 1.0,
                unit: TimeUnit::Second,
            },
        );

        assert!(launcher.start());
        assert!(wait_for(|| steps.load(Ordering::SeqCst) == 1));
        let elapsed = launcher.elapsed(TimeUnit::Second);

        assert!(!launcher.step());
        assert_eq!(launcher.state(), State::Running);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.elapsed(TimeUnit::Second), elapsed);

        assert!(launcher.stop());
    }

    #[test]
    fn step_is_allowed_while_paused() {
        let sim = Simulation::from_preset("world", IntegrationMethod::RungeKutta4).unwrap();
        let launcher = Launcher::new(sim, fast());

        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));
        assert!(launcher.pause());
        assert!(wait_for_state(&launcher, State::Paused));

        let before = launcher.perform_operation(|sim| sim.history().len()).unwrap();
        assert!(launcher.step());
        let after = launcher.perform_operation(|sim| sim.history().len()).unwrap();
        assert_eq!(after, before + 1);
        assert_eq!(launcher.state(), State::Paused);
    }

    #[test]
    fn rejects_non_positive_framerate() {
        let launcher = Launcher::new(Counter::new(), fast());
        assert!(!launcher.set_desired_framerate(0.0));
        assert!(!launcher.set_desired_framerate(-10.0));
        assert!(!launcher.set_desired_framerate(f64::NAN));
        assert_eq!(launcher.desired_fps(), 1000.0);

        assert!(launcher.set_desired_framerate(30.0));
        assert_eq!(launcher.desired_fps(), 30.0);
    }

    #[test]
    fn rejects_framerate_whose_frame_does_not_fit() {
        let launcher = Launcher::new(Counter::new(), fast());
        assert!(!launcher.set_desired_framerate(1e-20));
        assert!(!launcher.set_desired_framerate(f64::MIN_POSITIVE));
        assert_eq!(launcher.desired_fps(), 1000.0);
        assert!(launcher.step());

        let launcher = Launcher::new(
            Counter::new(),
            LauncherSettings {
                fps: 1e-20,
                ..fast()
            },
        );
        assert_eq!(launcher.desired_fps(), LauncherSettings::default().fps);
        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));
        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);
        assert!(launcher.start());
        assert!(launcher.stop());
    }

    #[test]
    fn stop_right_after_start() {
        let counter = Counter::new();
        let dropped = Arc::clone(&counter.dropped);
        let launcher = Launcher::new(counter, fast());

        assert!(launcher.start());
        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);
        // Joined: nothing left to stop, and the worker released the process.
        assert!(!launcher.stop());
        assert!(launcher.start());
        assert!(launcher.stop());
        drop(launcher);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn operations_never_observe_a_partial_step() {
        let sim = Simulation::from_preset("world", IntegrationMethod::RungeKutta4).unwrap();
        let launcher = Launcher::new(sim, fast());
        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));

        let mut lengths = Vec::new();
        for _ in 0..50 {
            let (len, consistent) = launcher
                .perform_operation(|sim| {
                    let history = sim.history();
                    (history.len(), history.iter().all(|values| values.len() == 4))
                })
                .unwrap();
            assert!(consistent);
            lengths.push(len);
            thread::sleep(Duration::from_micros(200));
        }
        assert!(launcher.stop());

        assert!(lengths.windows(2).all(|pair| pair[0] <= pair[1]));
        let total = launcher.perform_operation(|sim| sim.history().len()).unwrap();
        assert!(total >= *lengths.last().unwrap());
    }

    #[test]
    fn overrunning_frames_do_not_stall_the_worker() {
        let mut counter = Counter::new();
        // 5ms per step against a 1ms budget.
        counter.delay = Duration::from_millis(5);
        let steps = Arc::clone(&counter.steps);
        let launcher = Launcher::new(counter, fast());

        assert!(launcher.start());
        assert!(wait_for(|| steps.load(Ordering::SeqCst) >= 3));
        assert_eq!(launcher.state(), State::Running);
        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);
    }

    #[test]
    fn frame_budget_bounds() {
        assert_eq!(frame_budget(4.0), Some(Duration::from_millis(250)));
        assert_eq!(frame_budget(0.0), None);
        assert_eq!(frame_budget(f64::INFINITY), None);
        assert_eq!(frame_budget(1e-20), None);
    }

    #[test]
    fn invalid_initial_framerate_falls_back_to_default() {
        let launcher = Launcher::new(
            Counter::new(),
            LauncherSettings {
                fps: 0.0,
                ..LauncherSettings::default()
            },
        );
        assert_eq!(launcher.desired_fps(), LauncherSettings::default().fps);
    }

    #[test]
    fn panicking_process_keeps_worker_alive() {
        let mut counter = Counter::new();
        counter.panic = true;
        let steps = Arc::clone(&counter.steps);
        let launcher = Launcher::new(counter, fast());

        assert!(launcher.start());
        assert!(wait_for(|| steps.load(Ordering::SeqCst) >= 3));
        assert_eq!(launcher.state(), State::Running);
        assert!(launcher.stop());
        assert_eq!(launcher.state(), State::Stopped);
    }

    #[test]
    fn perform_operation_survives_panics() {
        let launcher = Launcher::new(Counter::new(), fast());

        let result: Option<()> = launcher.perform_operation(|_| panic!("bad operation"));
        assert!(result.is_none());

        let steps = launcher.perform_operation(|c| c.steps.load(Ordering::SeqCst));
        assert_eq!(steps, Some(0));
    }

    #[test]
    fn configure_requires_idle_launcher() {
        let sim = Simulation::from_preset("prey-predator", IntegrationMethod::Euler).unwrap();
        let launcher = Launcher::new(sim, fast());

        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));
        assert!(launcher.configure(|sim| sim.reset()).is_none());

        assert!(launcher.pause());
        assert!(wait_for_state(&launcher, State::Paused));
        let reset = launcher.configure(|sim| sim.reset()).unwrap();
        assert!(reset.is_ok());

        let history = launcher.perform_operation(|sim| sim.history().to_vec()).unwrap();
        assert_eq!(history, vec![vec![15.0, 1.0]]);
    }

    #[test]
    fn dropping_joins_the_worker() {
        let counter = Counter::new();
        let dropped = Arc::clone(&counter.dropped);
        let launcher = Launcher::new(counter, fast());

        assert!(launcher.start());
        assert!(wait_for_state(&launcher, State::Running));
        drop(launcher);

        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn state_names() {
        assert_eq!(State::PauseRequested.to_string(), "\"pause requested\"");
        assert_eq!(State::None.to_string(), "\"none\"");
    }
}
