// Linear algebra helpers shared by the controller and the avoidance signal

use nalgebra::{Matrix3, Vector3};

// Singular values at or below this are treated as zero when inverting
// task-space inertia.
pub const SVD_THRESHOLD: f64 = 0.00025;

pub fn pinv_svd(m: &Matrix3<f64>, threshold: f64) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Matrix3::zeros(),
    };

    let mut s_inv = Matrix3::zeros();
    for i in 0..3 {
        let s = svd.singular_values[i];
        if s > threshold {
            s_inv[(i, i)] = 1.0 / s;
        }
    }
    v_t.transpose() * s_inv * u.transpose()
}

// Task-space inertia `pinv(J M^-1 J^T)` for a linear Jacobian `jv`.
pub fn task_space_inertia(jv: &Matrix3<f64>, m_inv: &Matrix3<f64>) -> Matrix3<f64> {
    let mx_inv = jv * m_inv * jv.transpose();
    pinv_svd(&mx_inv, SVD_THRESHOLD)
}

pub fn vector3_from_slice(data: &[f64], offset: usize) -> Option<Vector3<f64>> {
    if data.len() < offset + 3 {
        return None;
    }
    Some(Vector3::new(data[offset], data[offset + 1], data[offset + 2]))
}

pub fn all_finite(data: &[f64]) -> bool {
    data.iter().all(|x| x.is_finite())
}
