/* Planar three-link arm: kinematic and dynamic parameters */

use log::debug;
use nalgebra::{Matrix3, Matrix6x3, Vector3};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use phf::phf_map;
use std::f64::consts::FRAC_PI_4;

pub const N_JOINTS: usize = 3;
pub const N_LINKS: usize = 3;

const FD_STEP: f64 = 1e-6;

#[derive(Debug)]
pub enum ArmError {
    UnknownFrame(String),
    DimensionMismatch(String),
    SingularInertia(String),
}

impl std::error::Error for ArmError {}

impl std::fmt::Display for ArmError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnknownFrame(msg) => write!(f, "Unknown frame: {}", msg),
            Self::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            Self::SingularInertia(msg) => write!(f, "Singular inertia: {}", msg),
        }
    }
}

// Named points on the arm. Links are addressed at their centre of mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Frame {
    Joint0 = 0,
    Joint1 = 1,
    Joint2 = 2,
    Link0 = 3,
    Link1 = 4,
    Link2 = 5,
    EndEffector = 6,
}

static FRAMES: phf::Map<&'static str, Frame> = phf_map! {
    "joint0" => Frame::Joint0,
    "joint1" => Frame::Joint1,
    "joint2" => Frame::Joint2,
    "link0" => Frame::Link0,
    "link1" => Frame::Link1,
    "link2" => Frame::Link2,
    "EE" => Frame::EndEffector,
};

impl Frame {
    pub fn from_name(name: &str) -> Result<Self, ArmError> {
        FRAMES.get(name).copied().ok_or_else(|| ArmError::UnknownFrame(name.to_string()))
    }

    pub fn link(index: usize) -> Result<Self, ArmError> {
        if index >= N_LINKS {
            return Err(ArmError::UnknownFrame(format!("link{}", index)));
        }
        Frame::try_from(Frame::Link0 as u8 + index as u8)
            .map_err(|_| ArmError::UnknownFrame(format!("link{}", index)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Joint0 => "joint0",
            Frame::Joint1 => "joint1",
            Frame::Joint2 => "joint2",
            Frame::Link0 => "link0",
            Frame::Link1 => "link1",
            Frame::Link2 => "link2",
            Frame::EndEffector => "EE",
        }
    }
}

// Static description of the arm. The arm moves in the x-y plane and every
// joint rotates about z.
#[derive(Debug, Clone)]
pub struct ArmConfig {
    pub lengths: [f64; N_LINKS],
    pub masses: [f64; N_LINKS],
    pub inertias: [f64; N_LINKS],
    pub rest_angles: [f64; N_JOINTS],
    pub gravity: Vector3<f64>,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self::threelink()
    }
}

impl ArmConfig {
    pub fn threelink() -> Self {
        let lengths = [2.0, 1.2, 0.7];
        let masses = [1.98, 1.32, 0.7];
        let mut inertias = [0.0; N_LINKS];
        for i in 0..N_LINKS {
            // slender rod about its centre
            inertias[i] = masses[i] * lengths[i] * lengths[i] / 12.0;
        }

        Self {
            lengths,
            masses,
            inertias,
            rest_angles: [FRAC_PI_4; N_JOINTS],
            gravity: Vector3::zeros(),
        }
    }

    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn num_joints(&self) -> usize {
        N_JOINTS
    }

    pub fn reach(&self) -> f64 {
        self.lengths.iter().sum()
    }

    fn check_q(&self, q: &[f64]) -> Result<[f64; N_JOINTS], ArmError> {
        if q.len() != N_JOINTS {
            return Err(ArmError::DimensionMismatch(format!(
                "expected {} joint values, got {}",
                N_JOINTS,
                q.len()
            )));
        }
        Ok([q[0], q[1], q[2]])
    }

    // Absolute angle of each link.
    fn link_angles(q: &[f64; N_JOINTS]) -> [f64; N_LINKS] {
        [q[0], q[0] + q[1], q[0] + q[1] + q[2]]
    }

    fn joint_origins(&self, q: &[f64; N_JOINTS]) -> [Vector3<f64>; N_JOINTS + 1] {
        let angles = Self::link_angles(q);
        let mut origins = [Vector3::zeros(); N_JOINTS + 1];
        for i in 0..N_LINKS {
            origins[i + 1] =
                origins[i] + self.lengths[i] * Vector3::new(angles[i].cos(), angles[i].sin(), 0.0);
        }
        origins
    }

    // The link a frame is rigidly attached to, and how far along it the frame sits.
    fn anchor(&self, frame: Frame) -> Option<(usize, f64)> {
        match frame {
            Frame::Joint0 => None,
            Frame::Joint1 => Some((0, self.lengths[0])),
            Frame::Joint2 => Some((1, self.lengths[1])),
            Frame::Link0 => Some((0, self.lengths[0] / 2.0)),
            Frame::Link1 => Some((1, self.lengths[1] / 2.0)),
            Frame::Link2 => Some((2, self.lengths[2] / 2.0)),
            Frame::EndEffector => Some((2, self.lengths[2])),
        }
    }

    // Resolve a frame plus a link-local offset to (link index, world point).
    fn locate(
        &self,
        frame: Frame,
        q: &[f64; N_JOINTS],
        offset: &Vector3<f64>,
    ) -> (Option<usize>, Vector3<f64>) {
        let origins = self.joint_origins(q);
        let angles = Self::link_angles(q);
        match self.anchor(frame) {
            None => (None, *offset),
            Some((link, along)) => {
                let rotation = nalgebra::Rotation3::from_axis_angle(&Vector3::z_axis(), angles[link]);
                let local = Vector3::new(along, 0.0, 0.0) + offset;
                (Some(link), origins[link] + rotation * local)
            }
        }
    }

    pub fn tx(&self, frame: Frame, q: &[f64]) -> Result<Vector3<f64>, ArmError> {
        self.tx_offset(frame, q, &Vector3::zeros())
    }

    // World position of a point given in the frame's link coordinates.
    pub fn tx_offset(
        &self,
        frame: Frame,
        q: &[f64],
        offset: &Vector3<f64>,
    ) -> Result<Vector3<f64>, ArmError> {
        let q = self.check_q(q)?;
        Ok(self.locate(frame, &q, offset).1)
    }

    pub fn tx_named(&self, name: &str, q: &[f64]) -> Result<Vector3<f64>, ArmError> {
        self.tx(Frame::from_name(name)?, q)
    }

    // Jacobian of a frame origin. Rows 0..3 are linear, rows 3..6 angular.
    pub fn j(&self, frame: Frame, q: &[f64]) -> Result<Matrix6x3<f64>, ArmError> {
        self.j_offset(frame, q, &Vector3::zeros())
    }

    pub fn j_offset(
        &self,
        frame: Frame,
        q: &[f64],
        offset: &Vector3<f64>,
    ) -> Result<Matrix6x3<f64>, ArmError> {
        let q = self.check_q(q)?;
        let (link, point) = self.locate(frame, &q, offset);
        let origins = self.joint_origins(&q);

        let mut jac = Matrix6x3::zeros();
        if let Some(link) = link {
            for col in 0..=link {
                let r = point - origins[col];
                jac[(0, col)] = -r.y;
                jac[(1, col)] = r.x;
                jac[(5, col)] = 1.0;
            }
        }
        Ok(jac)
    }

    pub fn m(&self, q: &[f64]) -> Result<Matrix3<f64>, ArmError> {
        let mut inertia = Matrix3::zeros();
        for i in 0..N_LINKS {
            let jac = self.j(Frame::link(i)?, q)?;
            let jv = jac.fixed_rows::<3>(0);
            let jw = jac.fixed_rows::<3>(3);
            inertia += self.masses[i] * jv.transpose() * jv;
            inertia += self.inertias[i] * jw.transpose() * jw;
        }
        Ok(inertia)
    }

    pub fn m_inv(&self, q: &[f64]) -> Result<Matrix3<f64>, ArmError> {
        self.m(q)?.try_inverse().ok_or_else(|| {
            ArmError::SingularInertia(format!("joint-space inertia not invertible at {:?}", q))
        })
    }

    // Torque needed to hold the arm against the configured gravity.
    pub fn g(&self, q: &[f64]) -> Result<Vector3<f64>, ArmError> {
        let mut torque = Vector3::zeros();
        if self.gravity.norm_squared() == 0.0 {
            return Ok(torque);
        }
        for i in 0..N_LINKS {
            let jac = self.j(Frame::link(i)?, q)?;
            let jv = jac.fixed_rows::<3>(0);
            torque -= jv.transpose() * (self.masses[i] * self.gravity);
        }
        Ok(torque)
    }

    // Coriolis and centrifugal torques, from Christoffel symbols of `m`.
    pub fn c(&self, q: &[f64], dq: &[f64]) -> Result<Vector3<f64>, ArmError> {
        let q = self.check_q(q)?;
        let dq = self.check_q(dq)?;

        // dm[k] = dM/dq_k
        let mut dm = [Matrix3::zeros(); N_JOINTS];
        for k in 0..N_JOINTS {
            let mut plus = q;
            let mut minus = q;
            plus[k] += FD_STEP;
            minus[k] -= FD_STEP;
            dm[k] = (self.m(&plus)? - self.m(&minus)?) / (2.0 * FD_STEP);
        }

        let mut torque = Vector3::zeros();
        for i in 0..N_JOINTS {
            for j in 0..N_JOINTS {
                for k in 0..N_JOINTS {
                    let christoffel = 0.5 * (dm[k][(i, j)] + dm[j][(i, k)] - dm[i][(j, k)]);
                    torque[i] += christoffel * dq[j] * dq[k];
                }
            }
        }
        debug!("coriolis at q={:?}: {:?}", q, torque.as_slice());
        Ok(torque)
    }
}
