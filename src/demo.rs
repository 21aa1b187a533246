/* Closed-loop obstacle avoidance demo: OSC plus avoidance signal on a simulated arm */

use crate::arm::{ArmConfig, ArmError, Frame};
use crate::avoid::{AvoidObstacles, Obstacle, Signal};
use crate::config::{ConfigError, DemoConfig};
use crate::controller::{Controller, Osc};
use crate::display::{ClickMode, PointerScript};
use crate::interface::{Interface, SimError, Simulator};
use crate::trajectory::TrajectoryLog;
use log::{debug, error, info};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub enum DemoError {
    Sim(SimError),
    Arm(ArmError),
    Config(ConfigError),
    Io(std::io::Error),
    Json(serde_json::Error),
    SignalMismatch(String),
    Aborted(String),
}

impl std::error::Error for DemoError {}

impl std::fmt::Display for DemoError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Sim(err) => write!(f, "Simulation error: {}", err),
            Self::Arm(err) => write!(f, "Arm error: {}", err),
            Self::Config(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "Io error: {}", err),
            Self::Json(err) => write!(f, "Json error: {}", err),
            Self::SignalMismatch(msg) => write!(f, "Signal mismatch: {}", msg),
            Self::Aborted(msg) => write!(f, "Control loop aborted: {}", msg),
        }
    }
}

impl From<SimError> for DemoError {
    fn from(err: SimError) -> Self {
        DemoError::Sim(err)
    }
}

impl From<ArmError> for DemoError {
    fn from(err: ArmError) -> Self {
        DemoError::Arm(err)
    }
}

impl From<ConfigError> for DemoError {
    fn from(err: ConfigError) -> Self {
        DemoError::Config(err)
    }
}

impl From<std::io::Error> for DemoError {
    fn from(err: std::io::Error) -> Self {
        DemoError::Io(err)
    }
}

impl From<serde_json::Error> for DemoError {
    fn from(err: serde_json::Error) -> Self {
        DemoError::Json(err)
    }
}

pub struct TargetSampler {
    rng: ChaCha8Rng,
    bounds: [[f64; 2]; 3],
}

impl TargetSampler {
    pub fn new(bounds: [[f64; 2]; 3], seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng, bounds }
    }

    pub fn sample(&mut self) -> Vector3<f64> {
        let mut xyz = Vector3::zeros();
        for (axis, [lo, hi]) in self.bounds.iter().enumerate() {
            xyz[axis] = lo + self.rng.gen::<f64>() * (hi - lo);
        }
        xyz
    }
}

// Strictly closer than `threshold`.
pub fn target_reached(hand: &Vector3<f64>, target: &Vector3<f64>, threshold: f64) -> bool {
    (target - hand).norm() < threshold
}

// Keeps an interface connected for its lifetime and disconnects it exactly once.
struct Connection<'a, I: Interface> {
    interface: &'a mut I,
    open: bool,
}

impl<'a, I: Interface> Connection<'a, I> {
    fn open(interface: &'a mut I) -> Result<Self, SimError> {
        interface.connect()?;
        Ok(Self { interface, open: true })
    }

    fn close(mut self) -> Result<(), SimError> {
        self.open = false;
        self.interface.disconnect()
    }
}

impl<I: Interface> Deref for Connection<'_, I> {
    type Target = I;

    fn deref(&self) -> &I {
        self.interface
    }
}

impl<I: Interface> DerefMut for Connection<'_, I> {
    fn deref_mut(&mut self) -> &mut I {
        self.interface
    }
}

impl<I: Interface> Drop for Connection<'_, I> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(err) = self.interface.disconnect() {
                error!("Failed to disconnect: {}", err);
            }
        }
    }
}

pub struct RunSummary {
    pub log: TrajectoryLog,
    pub steps: u64,
    pub targets_reached: u64,
    pub interrupted: bool,
}

pub struct ObstacleAvoidanceDemo<I, C, S> {
    arm: ArmConfig,
    interface: I,
    controller: C,
    avoid: S,
    sampler: TargetSampler,
    config: DemoConfig,
}

impl ObstacleAvoidanceDemo<Simulator, Osc, AvoidObstacles> {
    pub fn threelink(config: DemoConfig) -> Result<Self, DemoError> {
        config.validate()?;
        let arm = ArmConfig::threelink();
        let interface = Simulator::new(arm.clone(), config.dt, config.on_click)
            .with_damping(config.damping)
            .with_pointer_script(PointerScript::new(config.clicks.clone()));
        let controller = Osc::new(arm.clone(), config.kp, config.vmax).with_kv(config.kv());
        let avoid =
            AvoidObstacles::new(arm.clone(), config.avoid_threshold).with_gain(config.avoid_gain);
        Ok(Self::new(arm, interface, controller, avoid, config))
    }
}

impl<I: Interface, C: Controller, S: Signal> ObstacleAvoidanceDemo<I, C, S> {
    pub fn new(arm: ArmConfig, interface: I, controller: C, avoid: S, config: DemoConfig) -> Self {
        let sampler = TargetSampler::new(config.target_bounds, config.seed);
        Self { arm, interface, controller, avoid, sampler, config }
    }

    pub fn with_sampler(mut self, sampler: TargetSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn interface(&self) -> &I {
        &self.interface
    }

    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn signal(&self) -> &S {
        &self.avoid
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    // Run the feedback loop until `stop` is set or `max_steps` steps have
    // been taken. The interface is disconnected on every exit path.
    pub fn run(&mut self, stop: &AtomicBool, max_steps: Option<u64>) -> Result<RunSummary, DemoError> {
        let Self { arm, interface, controller, avoid, sampler, config } = self;

        let mut conn = Connection::open(interface)?;

        let obstacle_xyz = Vector3::from(config.obstacle_xyz);
        conn.display_mut().add_circle(obstacle_xyz, config.obstacle_radius);

        let mut target = Vector3::from(config.initial_target);
        conn.set_target(&target)?;

        let mut log = TrajectoryLog::new(config.dt);
        let mut steps: u64 = 0;
        let mut targets_reached: u64 = 0;

        // the pointer drives the obstacle, so it starts where the circle is drawn
        if conn.display().on_click() == ClickMode::Obstacle {
            conn.display_mut().set_mousexy(obstacle_xyz.x, obstacle_xyz.y);
            info!("Click to move the obstacle.");
        }

        while !stop.load(Ordering::Relaxed) {
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }

            // a click in target mode moves the target under us
            if let Some(shown) = conn.display().target() {
                target = shown;
            }

            let feedback = conn.get_feedback()?;
            let q = feedback.q.as_slice();
            let dq = feedback.dq.as_slice();
            let hand = arm.tx(Frame::EndEffector, q)?;

            let target_state = [target.x, target.y, target.z, 0.0, 0.0, 0.0];
            let mut u = controller.control(q, dq, &target_state)?;

            let obstacle = match conn.display().on_click() {
                ClickMode::Obstacle => {
                    let (obs_x, obs_y) = conn.display().get_mousexy();
                    Obstacle::new(obs_x, obs_y, 0.0, config.obstacle_radius)
                }
                _ => Obstacle { xyz: obstacle_xyz, radius: config.obstacle_radius },
            };
            let u_avoid = avoid.generate(q, &[obstacle])?;
            if u_avoid.len() != u.len() {
                return Err(DemoError::SignalMismatch(format!(
                    "controller gave {} values, avoidance gave {}",
                    u.len(),
                    u_avoid.len()
                )));
            }
            u += u_avoid;

            conn.apply_u(u.as_slice())?;

            if target_reached(&hand, &target, config.target_threshold) {
                target = sampler.sample();
                conn.set_target(&target)?;
                targets_reached += 1;
                info!(
                    "Target {} reached at step {}, next ({:.3}, {:.3}, {:.3})",
                    targets_reached, steps, target.x, target.y, target.z
                );
            }

            log.record(hand, target);
            steps += 1;

            if config.log_every > 0 && steps % config.log_every == 0 {
                info!("step {} distance to target {:.4}", steps, (target - hand).norm());
            } else {
                debug!("step {} u {:?}", steps, u.as_slice());
            }
        }

        let interrupted = stop.load(Ordering::Relaxed);
        conn.close()?;

        Ok(RunSummary { log, steps, targets_reached, interrupted })
    }
}

// Run `demo` on a blocking thread until it finishes or the process receives
// Ctrl-C. The demo is handed back alongside the summary.
pub async fn run_until_ctrl_c<I, C, S>(
    mut demo: ObstacleAvoidanceDemo<I, C, S>,
    max_steps: Option<u64>,
) -> Result<(ObstacleAvoidanceDemo<I, C, S>, RunSummary), DemoError>
where
    I: Interface + Send + 'static,
    C: Controller + Send + 'static,
    S: Signal + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let result = demo.run(&flag, max_steps);
        (demo, result)
    });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping control loop");
            stop.store(true, Ordering::SeqCst);
            handle.await
        }
    };

    let (demo, result) = joined.map_err(|err| DemoError::Aborted(err.to_string()))?;
    Ok((demo, result?))
}
