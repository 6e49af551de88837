//! Track angles: zenith, azimuth and scattering angles.

use muograph_core::Vec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scattering angles between an incoming and an outgoing direction (rad).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScatteringAngles {
    /// 3D angle between the two directions, in `[0, pi]`.
    pub dtheta: f64,
    /// Signed angle of the projections on the x-z plane.
    pub dtheta_x: f64,
    /// Signed angle of the projections on the y-z plane.
    pub dtheta_y: f64,
}

/// Zenith and azimuth of a direction.
///
/// `theta = acos(-v_z / |v|)`, so a downward-going track has `theta = 0`.
/// `phi = sign(v_y) * acos(v_x / sqrt(v_x^2 + v_y^2))`, set to 0 when the
/// direction has no transverse component (straight down or straight up).
#[must_use]
#[allow(clippy::float_cmp)]
pub fn zenith_azimuth(v: &Vec3) -> (f64, f64) {
    let theta = (-v.z / v.norm()).clamp(-1.0, 1.0).acos();
    let transverse = v.x.hypot(v.y);
    if transverse == 0.0 {
        return (theta, 0.0);
    }
    let phi = sign(v.y) * (v.x / transverse).clamp(-1.0, 1.0).acos();
    (theta, phi)
}

/// 3D and projected scattering angles from `v_in` to `v_out`.
///
/// The projected angles zero the orthogonal component of both vectors and
/// are positive when the projected outgoing component along x (resp. y) is
/// larger than the incoming one, negative otherwise. A projection of zero
/// length yields NaN for that angle.
#[must_use]
pub fn scattering_angles(v_in: &Vec3, v_out: &Vec3) -> ScatteringAngles {
    let dtheta = angle_between(v_in, v_out);

    let (x_in, x_out) = (Vec3::new(v_in.x, 0.0, v_in.z), Vec3::new(v_out.x, 0.0, v_out.z));
    let dtheta_x = signed(angle_between(&x_in, &x_out), x_out.x - x_in.x);

    let (y_in, y_out) = (Vec3::new(0.0, v_in.y, v_in.z), Vec3::new(0.0, v_out.y, v_out.z));
    let dtheta_y = signed(angle_between(&y_in, &y_out), y_out.y - y_in.y);

    ScatteringAngles {
        dtheta,
        dtheta_x,
        dtheta_y,
    }
}

/// Angle between two vectors, in `[0, pi]`.
///
/// Evaluated as `atan2(|a x b|, a . b)`. Identical inputs give exactly 0.
#[allow(clippy::float_cmp)]
fn angle_between(a: &Vec3, b: &Vec3) -> f64 {
    if a.norm_squared() == 0.0 || b.norm_squared() == 0.0 {
        return f64::NAN;
    }
    a.cross(b).norm().atan2(a.dot(b))
}

fn signed(angle: f64, delta: f64) -> f64 {
    if delta > 0.0 {
        angle
    } else {
        -angle
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
