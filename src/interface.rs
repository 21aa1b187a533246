/* Simulation interface for the three-link arm */

use crate::arm::{ArmConfig, ArmError, Frame, N_JOINTS};
use crate::display::{ClickMode, Display, PointerScript};
use crate::utils::all_finite;
use log::{debug, info, warn};
use nalgebra::{DVector, Vector3};

#[derive(Debug)]
pub enum SimError {
    NotConnected(String),
    InvalidControl(String),
    Diverged(String),
    Arm(ArmError),
}

impl std::error::Error for SimError {}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotConnected(msg) => write!(f, "Not connected: {}", msg),
            Self::InvalidControl(msg) => write!(f, "Invalid control: {}", msg),
            Self::Diverged(msg) => write!(f, "Simulation diverged: {}", msg),
            Self::Arm(err) => write!(f, "Arm error: {}", err),
        }
    }
}

impl From<ArmError> for SimError {
    fn from(err: ArmError) -> Self {
        SimError::Arm(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub q: DVector<f64>,
    pub dq: DVector<f64>,
}

// Everything the control loop needs from a robot or simulator.
pub trait Interface {
    fn connect(&mut self) -> Result<(), SimError>;

    // Disconnecting an interface that is not connected is a no-op.
    fn disconnect(&mut self) -> Result<(), SimError>;

    fn get_feedback(&mut self) -> Result<Feedback, SimError>;

    // Apply joint torques and advance by one timestep.
    fn apply_u(&mut self, u: &[f64]) -> Result<(), SimError>;

    fn set_target(&mut self, xyz: &Vector3<f64>) -> Result<(), SimError>;

    fn display(&self) -> &Display;

    fn display_mut(&mut self) -> &mut Display;
}

#[derive(Debug, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct Simulator {
    arm: ArmConfig,
    dt: f64,
    damping: f64,
    conn_state: ConnectionState,
    q: [f64; N_JOINTS],
    dq: [f64; N_JOINTS],
    steps: u64,
    display: Display,
    pointer: Option<PointerScript>,
}

impl Simulator {
    pub fn new(arm: ArmConfig, dt: f64, on_click: ClickMode) -> Self {
        let q = arm.rest_angles;
        Self {
            arm,
            dt,
            damping: 0.0,
            conn_state: ConnectionState::Disconnected,
            q,
            dq: [0.0; N_JOINTS],
            steps: 0,
            display: Display::new(on_click),
            pointer: None,
        }
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_pointer_script(mut self, script: PointerScript) -> Self {
        self.pointer = Some(script);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn_state == ConnectionState::Connected
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn elapsed(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    pub fn set_state(&mut self, q: [f64; N_JOINTS], dq: [f64; N_JOINTS]) {
        self.q = q;
        self.dq = dq;
    }

    fn ensure_connected(&self, action: &str) -> Result<(), SimError> {
        if !self.is_connected() {
            return Err(SimError::NotConnected(format!("cannot {} while disconnected", action)));
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<(), SimError> {
        let points = [Frame::Joint0, Frame::Joint1, Frame::Joint2, Frame::EndEffector]
            .iter()
            .map(|frame| self.arm.tx(*frame, &self.q))
            .collect::<Result<Vec<_>, _>>()?;
        self.display.set_arm(points);
        Ok(())
    }
}

impl Interface for Simulator {
    fn connect(&mut self) -> Result<(), SimError> {
        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(SimError::InvalidControl(format!("timestep must be positive, got {}", self.dt)));
        }
        self.q = self.arm.rest_angles;
        self.dq = [0.0; N_JOINTS];
        self.steps = 0;
        if let Some(pointer) = self.pointer.as_mut() {
            pointer.rewind();
        }
        self.conn_state = ConnectionState::Connected;
        self.redraw()?;
        info!("Simulation connected (dt = {})", self.dt);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SimError> {
        if self.conn_state == ConnectionState::Disconnected {
            debug!("Simulation already disconnected");
            return Ok(());
        }
        self.conn_state = ConnectionState::Disconnected;
        info!("Simulation disconnected after {} steps ({:.3}s)", self.steps, self.elapsed());
        Ok(())
    }

    fn get_feedback(&mut self) -> Result<Feedback, SimError> {
        self.ensure_connected("read feedback")?;
        Ok(Feedback {
            q: DVector::from_column_slice(&self.q),
            dq: DVector::from_column_slice(&self.dq),
        })
    }

    fn apply_u(&mut self, u: &[f64]) -> Result<(), SimError> {
        self.ensure_connected("apply control")?;
        if u.len() != N_JOINTS {
            return Err(SimError::InvalidControl(format!(
                "expected {} torques, got {}",
                N_JOINTS,
                u.len()
            )));
        }
        if !all_finite(u) {
            return Err(SimError::InvalidControl(format!("non-finite torque {:?}", u)));
        }

        let u = Vector3::from_row_slice(u);
        let dq = Vector3::from_row_slice(&self.dq);
        let m_inv = self.arm.m_inv(&self.q)?;
        let bias = self.arm.c(&self.q, &self.dq)? + self.arm.g(&self.q)? + self.damping * dq;
        let ddq = m_inv * (u - bias);

        // semi-implicit Euler
        let dq = dq + ddq * self.dt;
        let mut q = self.q;
        for i in 0..N_JOINTS {
            q[i] += dq[i] * self.dt;
        }
        if !all_finite(&q) || !all_finite(dq.as_slice()) {
            warn!("State became non-finite at step {}", self.steps);
            return Err(SimError::Diverged(format!("q={:?} dq={:?}", q, dq.as_slice())));
        }

        self.q = q;
        self.dq = [dq[0], dq[1], dq[2]];
        self.steps += 1;
        self.redraw()?;

        let now = self.elapsed();
        if let Some(pointer) = self.pointer.as_mut() {
            for (x, y) in pointer.poll(now) {
                self.display.click(x, y);
            }
        }
        Ok(())
    }

    fn set_target(&mut self, xyz: &Vector3<f64>) -> Result<(), SimError> {
        self.display.set_target(*xyz);
        debug!("Target set to {:?}", xyz.as_slice());
        Ok(())
    }

    fn display(&self) -> &Display {
        &self.display
    }

    fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }
}
