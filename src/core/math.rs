//! 3D vector and rotation algebra used throughout the engine.
//!
//! All quantities are `f64`; positions and velocities are plain Cartesian
//! triples, orientations are unit quaternions.

use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

/// Spatial dimension of the engine.
pub const DIM: usize = 3;

/// A 3D Cartesian vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn norm_sq(&self) -> f64 {
        self.dot(*self)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Unit vector in the same direction; `None` for a (near-)zero vector.
    pub fn normalized(&self) -> Option<Vec3> {
        let n = self.norm();
        if n < 1e-300 {
            return None;
        }
        Some(*self / n)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index out of range: {i}"),
        }
    }
}

impl IndexMut<usize> for Vec3 {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Vec3 index out of range: {i}"),
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, o: Vec3) {
        *self = *self + o;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl SubAssign for Vec3 {
    #[inline]
    fn sub_assign(&mut self, o: Vec3) {
        *self = *self - o;
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn div(self, s: f64) -> Vec3 {
        Vec3::new(self.x / s, self.y / s, self.z / s)
    }
}

/// A unit quaternion representing a 3D rotation.
///
/// Convention: `w` is the scalar part, `v` the vector part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub v: Vec3,
}

impl Quaternion {
    /// Identity rotation.
    pub const fn identity() -> Self {
        Self {
            w: 1.0,
            v: Vec3::zero(),
        }
    }

    /// Rotation of `angle` radians about the unit vector `axis`.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let (s, c) = (0.5 * angle).sin_cos();
        Self { w: c, v: axis * s }
    }

    /// The reference director rotated by the identity orientation. Rigid
    /// bodies store their orientation relative to this axis.
    pub const fn initial_director() -> Vec3 {
        Vec3::new(0.0, 0.0, 1.0)
    }

    pub fn normalized(&self) -> Self {
        let n = (self.w * self.w + self.v.norm_sq()).sqrt();
        if n < 1e-12 {
            return Self::identity();
        }
        Self {
            w: self.w / n,
            v: self.v / n,
        }
    }

    /// Hamilton product `self * other` (apply `other` first).
    pub fn mul(&self, other: &Quaternion) -> Quaternion {
        Quaternion {
            w: self.w * other.w - self.v.dot(other.v),
            v: self.v.cross(other.v) + other.v * self.w + self.v * other.w,
        }
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(&self, r: Vec3) -> Vec3 {
        // q v q* expanded with the double-cross identity.
        let t = self.v.cross(r) * 2.0;
        r + t * self.w + self.v.cross(t)
    }

    /// Free rotation: advance an orientation by angular velocity `omega`
    /// over `dt` and renormalize.
    pub fn advance(&self, omega: Vec3, dt: f64) -> Quaternion {
        let speed = omega.norm();
        if speed * dt == 0.0 {
            return *self;
        }
        Quaternion::from_axis_angle(omega / speed, speed * dt)
            .mul(self)
            .normalized()
    }
}
