//! Vector and quaternion expressions

use glam::DVec3;

use super::{Expr, ParamValues};
use crate::handle::ParamId;

/// A 3-vector whose components are expressions
#[derive(Debug, Clone, PartialEq)]
pub struct ExprVector {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl ExprVector {
    pub fn new(x: Expr, y: Expr, z: Expr) -> Self {
        Self { x, y, z }
    }

    /// Vector of three parameter references
    pub fn from_params(x: ParamId, y: ParamId, z: ParamId) -> Self {
        Self::new(Expr::param(x), Expr::param(y), Expr::param(z))
    }

    /// Constant vector
    pub fn from_vec(v: DVec3) -> Self {
        Self::new(Expr::constant(v.x), Expr::constant(v.y), Expr::constant(v.z))
    }

    pub fn plus(&self, b: &ExprVector) -> ExprVector {
        ExprVector::new(
            self.x.clone() + b.x.clone(),
            self.y.clone() + b.y.clone(),
            self.z.clone() + b.z.clone(),
        )
    }

    pub fn minus(&self, b: &ExprVector) -> ExprVector {
        ExprVector::new(
            self.x.clone() - b.x.clone(),
            self.y.clone() - b.y.clone(),
            self.z.clone() - b.z.clone(),
        )
    }

    pub fn dot(&self, b: &ExprVector) -> Expr {
        self.x.clone() * b.x.clone() + self.y.clone() * b.y.clone() + self.z.clone() * b.z.clone()
    }

    pub fn cross(&self, b: &ExprVector) -> ExprVector {
        ExprVector::new(
            self.y.clone() * b.z.clone() - self.z.clone() * b.y.clone(),
            self.z.clone() * b.x.clone() - self.x.clone() * b.z.clone(),
            self.x.clone() * b.y.clone() - self.y.clone() * b.x.clone(),
        )
    }

    pub fn scaled_by(&self, s: &Expr) -> ExprVector {
        ExprVector::new(
            self.x.clone() * s.clone(),
            self.y.clone() * s.clone(),
            self.z.clone() * s.clone(),
        )
    }

    /// Euclidean length
    pub fn magnitude(&self) -> Expr {
        (self.x.clone().square() + self.y.clone().square() + self.z.clone().square()).sqrt()
    }

    /// This vector rescaled to length `s`
    pub fn with_magnitude(&self, s: Expr) -> ExprVector {
        let m = self.magnitude();
        self.scaled_by(&(s / m))
    }

    pub fn eval<V: ParamValues + ?Sized>(&self, values: &V) -> DVec3 {
        DVec3::new(self.x.eval(values), self.y.eval(values), self.z.eval(values))
    }
}

/// A quaternion `w + vx·i + vy·j + vz·k` whose components are expressions
#[derive(Debug, Clone, PartialEq)]
pub struct ExprQuaternion {
    pub w: Expr,
    pub vx: Expr,
    pub vy: Expr,
    pub vz: Expr,
}

impl ExprQuaternion {
    pub fn new(w: Expr, vx: Expr, vy: Expr, vz: Expr) -> Self {
        Self { w, vx, vy, vz }
    }

    /// Quaternion of four parameter references, in `w, x, y, z` order
    pub fn from_params(params: [ParamId; 4]) -> Self {
        Self::new(
            Expr::param(params[0]),
            Expr::param(params[1]),
            Expr::param(params[2]),
            Expr::param(params[3]),
        )
    }

    /// Image of the X axis under this rotation
    pub fn rotation_u(&self) -> ExprVector {
        let (w, vx, vy, vz) = (&self.w, &self.vx, &self.vy, &self.vz);
        let two = || Expr::constant(2.0);
        ExprVector::new(
            w.clone().square() + vx.clone().square() - vy.clone().square() - vz.clone().square(),
            two() * (w.clone() * vz.clone()) + two() * (vx.clone() * vy.clone()),
            two() * (vx.clone() * vz.clone()) - two() * (w.clone() * vy.clone()),
        )
    }

    /// Image of the Y axis under this rotation
    pub fn rotation_v(&self) -> ExprVector {
        let (w, vx, vy, vz) = (&self.w, &self.vx, &self.vy, &self.vz);
        let two = || Expr::constant(2.0);
        ExprVector::new(
            two() * (vx.clone() * vy.clone()) - two() * (w.clone() * vz.clone()),
            w.clone().square() - vx.clone().square() + vy.clone().square() - vz.clone().square(),
            two() * (w.clone() * vx.clone()) + two() * (vy.clone() * vz.clone()),
        )
    }

    /// Image of the Z axis under this rotation
    pub fn rotation_n(&self) -> ExprVector {
        let (w, vx, vy, vz) = (&self.w, &self.vx, &self.vy, &self.vz);
        let two = || Expr::constant(2.0);
        ExprVector::new(
            two() * (w.clone() * vy.clone()) + two() * (vx.clone() * vz.clone()),
            two() * (vy.clone() * vz.clone()) - two() * (w.clone() * vx.clone()),
            w.clone().square() - vx.clone().square() - vy.clone().square() + vz.clone().square(),
        )
    }

    /// Rotate `p` by this quaternion (assumed unit length)
    pub fn rotate(&self, p: &ExprVector) -> ExprVector {
        self.rotation_u()
            .scaled_by(&p.x)
            .plus(&self.rotation_v().scaled_by(&p.y))
            .plus(&self.rotation_n().scaled_by(&p.z))
    }

    /// Hamilton product `self * b`
    pub fn times(&self, b: &ExprQuaternion) -> ExprQuaternion {
        let va = ExprVector::new(self.vx.clone(), self.vy.clone(), self.vz.clone());
        let vb = ExprVector::new(b.vx.clone(), b.vy.clone(), b.vz.clone());
        let w = self.w.clone() * b.w.clone() - va.dot(&vb);
        let v = vb.scaled_by(&self.w).plus(&va.scaled_by(&b.w).plus(&va.cross(&vb)));
        ExprQuaternion::new(w, v.x, v.y, v.z)
    }

    pub fn magnitude(&self) -> Expr {
        (self.w.clone().square()
            + self.vx.clone().square()
            + self.vy.clone().square()
            + self.vz.clone().square())
        .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant_quaternion(w: f64, x: f64, y: f64, z: f64) -> ExprQuaternion {
        ExprQuaternion::new(
            Expr::constant(w),
            Expr::constant(x),
            Expr::constant(y),
            Expr::constant(z),
        )
    }

    fn no_params(_: ParamId) -> f64 {
        f64::NAN
    }

    #[test]
    fn test_identity_basis() {
        let q = constant_quaternion(1.0, 0.0, 0.0, 0.0);
        assert_eq!(q.rotation_u().eval(&no_params), DVec3::X);
        assert_eq!(q.rotation_v().eval(&no_params), DVec3::Y);
        assert_eq!(q.rotation_n().eval(&no_params), DVec3::Z);
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let q = constant_quaternion(h, 0.0, 0.0, h);
        let u = q.rotation_u().eval(&no_params);
        let v = q.rotation_v().eval(&no_params);
        assert_relative_eq!(u.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(u.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.x, -1.0, epsilon = 1e-12);

        let p = ExprVector::from_vec(DVec3::new(2.0, 0.0, 5.0));
        let r = q.rotate(&p).eval(&no_params);
        assert_relative_eq!(r.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(r.z, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_and_magnitude() {
        let a = ExprVector::from_vec(DVec3::X);
        let b = ExprVector::from_vec(DVec3::Y);
        assert_eq!(a.cross(&b).eval(&no_params), DVec3::Z);

        let c = ExprVector::from_vec(DVec3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(c.magnitude().eval(&no_params), 5.0);
        let unit = c.with_magnitude(Expr::constant(1.0)).eval(&no_params);
        assert_relative_eq!(unit.length(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_product_composes_rotations() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let z90 = constant_quaternion(h, 0.0, 0.0, h);
        let z180 = z90.times(&z90);
        let u = z180.rotation_u().eval(&no_params);
        assert_relative_eq!(u.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(z180.magnitude().eval(&no_params), 1.0, epsilon = 1e-12);
    }
}
