/* Operational space controller for the end effector */

use crate::arm::{ArmConfig, ArmError, Frame};
use crate::utils::{task_space_inertia, vector3_from_slice};
use log::debug;
use nalgebra::{DVector, Matrix3, Vector3};

pub trait Controller {
    // `target_state` is `[x, y, z]` or `[x, y, z, dx, dy, dz]`.
    fn control(
        &mut self,
        q: &[f64],
        dq: &[f64],
        target_state: &[f64],
    ) -> Result<DVector<f64>, ArmError>;
}

pub struct Osc {
    arm: ArmConfig,
    kp: f64,
    kv: f64,
    vmax: Option<f64>,
    null_damping: bool,
}

impl Osc {
    pub fn new(arm: ArmConfig, kp: f64, vmax: Option<f64>) -> Self {
        Self { arm, kp, kv: kp.sqrt(), vmax, null_damping: true }
    }

    pub fn with_kv(mut self, kv: f64) -> Self {
        self.kv = kv;
        self
    }

    pub fn without_null_damping(mut self) -> Self {
        self.null_damping = false;
        self
    }

    pub fn kp(&self) -> f64 {
        self.kp
    }

    pub fn kv(&self) -> f64 {
        self.kv
    }

    // Task-space acceleration command.
    fn task_command(
        &self,
        x_tilde: &Vector3<f64>,
        dx: &Vector3<f64>,
        target_dx: &Vector3<f64>,
    ) -> Vector3<f64> {
        match self.vmax {
            None => -self.kp * x_tilde - self.kv * (dx - target_dx),
            Some(vmax) => {
                let lamb = self.kp / self.kv;
                let mut dx_des = -lamb * x_tilde;
                let speed = dx_des.norm();
                if speed > 0.0 {
                    dx_des *= num_traits::clamp(vmax / speed, 0.0, 1.0);
                }
                self.kv * (dx_des + target_dx - dx)
            }
        }
    }
}

impl Controller for Osc {
    fn control(
        &mut self,
        q: &[f64],
        dq: &[f64],
        target_state: &[f64],
    ) -> Result<DVector<f64>, ArmError> {
        let target = vector3_from_slice(target_state, 0).ok_or_else(|| {
            ArmError::DimensionMismatch(format!(
                "target state needs at least 3 values, got {}",
                target_state.len()
            ))
        })?;
        let target_dx = vector3_from_slice(target_state, 3).unwrap_or_else(Vector3::zeros);
        if dq.len() != self.arm.num_joints() {
            return Err(ArmError::DimensionMismatch(format!(
                "expected {} joint velocities, got {}",
                self.arm.num_joints(),
                dq.len()
            )));
        }
        let dq = Vector3::from_row_slice(dq);

        let x = self.arm.tx(Frame::EndEffector, q)?;
        let jv: Matrix3<f64> = self.arm.j(Frame::EndEffector, q)?.fixed_rows::<3>(0).into_owned();
        let m = self.arm.m(q)?;
        let m_inv = self.arm.m_inv(q)?;
        let mx = task_space_inertia(&jv, &m_inv);

        let dx = jv * dq;
        let x_tilde = x - target;
        let u_task = self.task_command(&x_tilde, &dx, &target_dx);

        let mut u = jv.transpose() * (mx * u_task) + self.arm.g(q)?;

        if self.null_damping {
            let jbar = m_inv * jv.transpose() * mx;
            let null_filter = Matrix3::identity() - jv.transpose() * jbar.transpose();
            u += null_filter * (-self.kv * (m * dq));
        }

        debug!("osc error {:.4} u {:?}", x_tilde.norm(), u.as_slice());
        Ok(DVector::from_column_slice(u.as_slice()))
    }
}
