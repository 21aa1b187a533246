/* Obstacle avoidance signal: a potential field pushing the arm away from circles */

use crate::arm::{ArmConfig, ArmError, Frame};
use crate::utils::task_space_inertia;
use log::debug;
use nalgebra::{DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// Points closer than this to the surface, or inside the obstacle, feel the
// force at this clearance.
const MIN_CLEARANCE: f64 = 0.05;

// Below this the direction to the obstacle centre is undefined.
const MIN_DISTANCE: f64 = 1e-9;

const AVOID_FRAMES: [Frame; 4] = [Frame::Link0, Frame::Link1, Frame::Link2, Frame::EndEffector];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub xyz: Vector3<f64>,
    pub radius: f64,
}

impl Obstacle {
    pub fn new(x: f64, y: f64, z: f64, radius: f64) -> Self {
        Self { xyz: Vector3::new(x, y, z), radius }
    }
}

impl From<[f64; 4]> for Obstacle {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

pub trait Signal {
    fn generate(&mut self, q: &[f64], obstacles: &[Obstacle]) -> Result<DVector<f64>, ArmError>;
}

pub struct AvoidObstacles {
    arm: ArmConfig,
    threshold: f64,
    gain: f64,
}

impl AvoidObstacles {
    pub fn new(arm: ArmConfig, threshold: f64) -> Self {
        Self { arm, threshold, gain: 0.02 }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    // Force on a frame, `v` being the vector from the frame to the obstacle centre.
    fn repulsion(&self, v: &Vector3<f64>, radius: f64) -> Option<Vector3<f64>> {
        let dist = v.norm();
        if dist < MIN_DISTANCE {
            return None;
        }
        let rho = (dist - radius).max(MIN_CLEARANCE);
        if rho >= self.threshold {
            return None;
        }
        let drhodx = v / dist;
        Some(self.gain * (1.0 / rho - 1.0 / self.threshold) * (1.0 / (rho * rho)) * drhodx)
    }
}

impl Signal for AvoidObstacles {
    fn generate(&mut self, q: &[f64], obstacles: &[Obstacle]) -> Result<DVector<f64>, ArmError> {
        let mut u = Vector3::zeros();
        if obstacles.is_empty() {
            return Ok(DVector::from_column_slice(u.as_slice()));
        }

        let m_inv = self.arm.m_inv(q)?;
        for frame in AVOID_FRAMES {
            let xyz = self.arm.tx(frame, q)?;
            for obstacle in obstacles {
                let v = obstacle.xyz - xyz;
                let force = match self.repulsion(&v, obstacle.radius) {
                    Some(force) => force,
                    None => continue,
                };

                let jv: Matrix3<f64> = self.arm.j(frame, q)?.fixed_rows::<3>(0).into_owned();
                let mx = task_space_inertia(&jv, &m_inv);
                u -= jv.transpose() * (mx * force);
                debug!("{} within {:.3} of obstacle", frame.name(), v.norm() - obstacle.radius);
            }
        }

        Ok(DVector::from_column_slice(u.as_slice()))
    }
}
