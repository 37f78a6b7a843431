//! Boundary conditions.
//!
//! The primary image is centred on the origin: each axis spans
//! `[-L/2, +L/2)`. Lees–Edwards boundaries slide the periodic images above
//! and below the primary cell in x at the shear rate, so both the position
//! remap and the velocity remap depend on the simulation time.

use crate::core::math::Vec3;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryKind {
    /// Open rectangular domain; containment comes from wall locals.
    Rectangular,
    /// Standard periodic wrapping on all axes.
    Periodic,
    /// Sheared periodic boundaries: images along y slide in x at
    /// `shear_rate`.
    LeesEdwards { shear_rate: f64 },
}

/// The simulation domain and its image convention.
#[derive(Debug, Clone, Copy)]
pub struct Boundary {
    pub kind: BoundaryKind,
    pub box_size: Vec3,
}

impl Boundary {
    pub fn new(kind: BoundaryKind, box_size: Vec3) -> Result<Self> {
        if !(box_size.is_finite() && box_size.x > 0.0 && box_size.y > 0.0 && box_size.z > 0.0) {
            return Err(Error::InvalidParam(
                "box size components must be finite and > 0".into(),
            ));
        }
        Ok(Self { kind, box_size })
    }

    /// Relative x displacement of the y-adjacent images at time `t`,
    /// folded into the primary cell.
    pub fn shear_displacement(&self, time: f64) -> f64 {
        match self.kind {
            BoundaryKind::LeesEdwards { shear_rate } => {
                let raw = shear_rate * time * self.box_size.y;
                raw - (raw / self.box_size.x).round() * self.box_size.x
            }
            _ => 0.0,
        }
    }

    /// Shear rate, zero for non-shearing boundaries.
    pub fn shear_rate(&self) -> f64 {
        match self.kind {
            BoundaryKind::LeesEdwards { shear_rate } => shear_rate,
            _ => 0.0,
        }
    }

    /// Remap a position into the primary image.
    pub fn apply_bc(&self, pos: &mut Vec3, time: f64) {
        match self.kind {
            BoundaryKind::Rectangular => {}
            BoundaryKind::Periodic => self.wrap(pos),
            BoundaryKind::LeesEdwards { .. } => {
                let images_y = (pos.y / self.box_size.y).round();
                pos.x -= images_y * self.shear_displacement(time);
                self.wrap(pos);
            }
        }
    }

    /// Remap a position and its velocity into the primary image. For
    /// Lees–Edwards the velocity picks up the image drift: crossing one y
    /// image changes v_x by `shear_rate * Ly`.
    pub fn apply_bc_vel(&self, pos: &mut Vec3, vel: &mut Vec3, time: f64) {
        if let BoundaryKind::LeesEdwards { shear_rate } = self.kind {
            let images_y = (pos.y / self.box_size.y).round();
            vel.x -= images_y * shear_rate * self.box_size.y;
        }
        self.apply_bc(pos, time);
    }

    /// Minimum-image separation and relative velocity of a pair.
    pub fn separation(&self, mut rij: Vec3, mut vij: Vec3, time: f64) -> (Vec3, Vec3) {
        self.apply_bc_vel(&mut rij, &mut vij, time);
        (rij, vij)
    }

    fn wrap(&self, pos: &mut Vec3) {
        for k in 0..3 {
            let l = self.box_size[k];
            pos[k] -= (pos[k] / l).round() * l;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube(kind: BoundaryKind) -> Boundary {
        Boundary::new(kind, Vec3::new(10.0, 10.0, 10.0)).unwrap()
    }

    #[test]
    fn periodic_wraps_to_primary_image() {
        let bc = cube(BoundaryKind::Periodic);
        let mut pos = Vec3::new(6.0, -7.0, 0.0);
        bc.apply_bc(&mut pos, 0.0);
        assert_relative_eq!(pos.x, -4.0);
        assert_relative_eq!(pos.y, 3.0);
    }

    #[test]
    fn rectangular_leaves_positions_alone() {
        let bc = cube(BoundaryKind::Rectangular);
        let mut pos = Vec3::new(60.0, -70.0, 0.0);
        bc.apply_bc(&mut pos, 0.0);
        assert_relative_eq!(pos.x, 60.0);
    }

    #[test]
    fn lees_edwards_shifts_velocity_across_y_image() {
        let bc = cube(BoundaryKind::LeesEdwards { shear_rate: 0.5 });
        // One image up in y.
        let mut pos = Vec3::new(0.0, 7.0, 0.0);
        let mut vel = Vec3::new(1.0, 1.0, 0.0);
        bc.apply_bc_vel(&mut pos, &mut vel, 0.0);
        // v_x loses shear_rate * Ly for the crossed image.
        assert_relative_eq!(vel.x, 1.0 - 0.5 * 10.0);
        assert_relative_eq!(pos.y, -3.0);
    }

    #[test]
    fn lees_edwards_shifts_position_with_strain() {
        let bc = cube(BoundaryKind::LeesEdwards { shear_rate: 0.1 });
        // At t=2 the adjacent image has slid by 0.1 * 2 * 10 = 2.
        let mut pos = Vec3::new(0.0, 7.0, 0.0);
        bc.apply_bc(&mut pos, 2.0);
        assert_relative_eq!(pos.x, -2.0);
        assert_relative_eq!(pos.y, -3.0);
    }

    #[test]
    fn shear_displacement_folds_into_box() {
        let bc = cube(BoundaryKind::LeesEdwards { shear_rate: 1.0 });
        // strain displacement = 1.0 * 13 * 10 = 130 -> folded to [-5, 5)
        let d = bc.shear_displacement(13.0);
        assert!((-5.0..5.0).contains(&d));
    }
}
