//! Numeric quaternion helpers
//!
//! Normals are stored as unit quaternions whose rotated X/Y/Z axes form the
//! U/V/N basis of a plane. These helpers convert between that form and
//! plain vectors.

use glam::{DQuat, DVec3};

/// Build the unit quaternion whose U and V basis vectors are `u` and `v`.
///
/// `u` and `v` are expected to be orthonormal; the result is normalized.
pub fn make_quaternion(u: DVec3, v: DVec3) -> DQuat {
    let n = u.cross(v);
    let trace = 1.0 + u.x + v.y + n.z;

    let (w, x, y, z) = if trace > 1e-4 {
        let s = 2.0 * trace.sqrt();
        (s / 4.0, (v.z - n.y) / s, (n.x - u.z) / s, (u.y - v.x) / s)
    } else if u.x > v.y && u.x > n.z {
        let s = 2.0 * (1.0 + u.x - v.y - n.z).sqrt();
        ((v.z - n.y) / s, s / 4.0, (u.y + v.x) / s, (n.x + u.z) / s)
    } else if v.y > n.z {
        let s = 2.0 * (1.0 - u.x + v.y - n.z).sqrt();
        ((n.x - u.z) / s, (u.y + v.x) / s, s / 4.0, (v.z + n.y) / s)
    } else {
        let s = 2.0 * (1.0 - u.x - v.y + n.z).sqrt();
        ((u.y - v.x) / s, (n.x + u.z) / s, (v.z + n.y) / s, s / 4.0)
    };

    DQuat::from_xyzw(x, y, z, w).normalize()
}

/// First basis vector of the plane described by `q`
pub fn quaternion_u(q: DQuat) -> DVec3 {
    DVec3::new(
        q.w * q.w + q.x * q.x - q.y * q.y - q.z * q.z,
        2.0 * q.w * q.z + 2.0 * q.x * q.y,
        2.0 * q.x * q.z - 2.0 * q.w * q.y,
    )
}

/// Second basis vector of the plane described by `q`
pub fn quaternion_v(q: DQuat) -> DVec3 {
    DVec3::new(
        2.0 * q.x * q.y - 2.0 * q.w * q.z,
        q.w * q.w - q.x * q.x + q.y * q.y - q.z * q.z,
        2.0 * q.w * q.x + 2.0 * q.y * q.z,
    )
}

/// Normal of the plane described by `q`
pub fn quaternion_n(q: DQuat) -> DVec3 {
    DVec3::new(
        2.0 * q.w * q.y + 2.0 * q.x * q.z,
        2.0 * q.y * q.z - 2.0 * q.w * q.x,
        q.w * q.w - q.x * q.x - q.y * q.y + q.z * q.z,
    )
}

/// Parameter order used for normals: `[w, x, y, z]`
pub fn quaternion_components(q: DQuat) -> [f64; 4] {
    [q.w, q.x, q.y, q.z]
}
