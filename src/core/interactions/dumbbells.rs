use crate::core::capture::CaptureMap;
use crate::core::context::{EventCtx, PredictCtx};
use crate::core::event::{EventKind, PairEventData, Prediction};
use crate::core::interactions::Interaction;
use crate::core::math::Vec3;
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// A rigid dumbbell: two hard spheres (diameters `diam_a`, `diam_b`) fixed
/// at `la` and `-lb` along each particle's director.
///
/// The capture map tracks pairs whose bounding spheres intersect; only
/// captured pairs pay for the expensive off-centre contact search. Contacts
/// exchange linear and angular momentum through the off-centre arms.
#[derive(Debug, Clone)]
pub struct Dumbbells {
    name: String,
    diam_a: f64,
    diam_b: f64,
    la: f64,
    lb: f64,
    elasticity: f64,
    /// When set, the collision zeroes this linear component and the two
    /// orthogonal angular components, confining motion to a plane.
    unused_dimension: Option<usize>,
    captured: CaptureMap,
}

impl Dumbbells {
    pub fn new(
        name: impl Into<String>,
        diam_a: f64,
        diam_b: f64,
        la: f64,
        lb: f64,
        elasticity: f64,
    ) -> Result<Self> {
        for (label, v) in [
            ("DiameterA", diam_a),
            ("DiameterB", diam_b),
            ("LA", la),
            ("LB", lb),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::InvalidParam(format!(
                    "{label} must be finite and >= 0"
                )));
            }
        }
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(Error::InvalidParam("elasticity must lie in [0, 1]".into()));
        }
        Ok(Self {
            name: name.into(),
            diam_a,
            diam_b,
            la,
            lb,
            elasticity,
            unused_dimension: None,
            captured: CaptureMap::new(),
        })
    }

    pub fn with_unused_dimension(mut self, dim: usize) -> Self {
        self.unused_dimension = Some(dim);
        self
    }

    /// Bounding-sphere radius of one dumbbell.
    fn bounding_radius(&self) -> f64 {
        (self.la + 0.5 * self.diam_a).max(self.lb + 0.5 * self.diam_b)
    }

    fn max_dist2(&self) -> f64 {
        let d = 2.0 * self.bounding_radius();
        d * d
    }

    /// The four sphere pairings of a dumbbell pair: signed arms and the
    /// diameters they carry.
    fn pairings(&self) -> [(f64, f64, f64, f64); 4] {
        [
            (self.la, self.diam_a, self.la, self.diam_a),
            (self.la, self.diam_a, -self.lb, self.diam_b),
            (-self.lb, self.diam_b, self.la, self.diam_a),
            (-self.lb, self.diam_b, -self.lb, self.diam_b),
        ]
    }
}

impl Interaction for Dumbbells {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_int_dist(&self) -> f64 {
        2.0 * self.bounding_radius()
    }

    fn uses_rotation(&self) -> bool {
        true
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Result<Prediction> {
        let (rij, vij) = ctx.pair_separation(p1, p2);
        let rot1 = ctx.dynamics.rot_data(p1).ok_or_else(|| {
            Error::Numeric(format!("particle {p1} has no orientation data"))
        })?;
        let rot2 = ctx.dynamics.rot_data(p2).ok_or_else(|| {
            Error::Numeric(format!("particle {p2} has no orientation data"))
        })?;

        if self.captured.contains(p1, p2) {
            // The bounding spheres separate at this time at the latest.
            let upper = ctx.dynamics.sphere_sphere_out_root(rij, vij, self.max_dist2())?;

            let mut best: (bool, f64) = (false, f64::INFINITY);
            for (l1, d1, l2, d2) in self.pairings() {
                let window = upper.min(best.1);
                let found = ctx.dynamics.offcentre_spheres_collision(
                    l1, d1, l2, d2, rij, vij, rot1, rot2, window,
                )?;
                if found.1 < best.1 {
                    best = found;
                }
            }

            if best.1 == f64::INFINITY {
                return Ok(Prediction::new(upper, EventKind::NbhoodOut));
            }
            return Ok(if best.0 {
                Prediction::new(best.1, EventKind::Core)
            } else {
                Prediction::new(best.1, EventKind::Virtual)
            });
        }

        match ctx
            .dynamics
            .sphere_sphere_in_root(rij, vij, self.max_dist2())?
        {
            Some(dt) => Ok(Prediction::new(dt, EventKind::NbhoodIn)),
            None => Ok(Prediction::none()),
        }
    }

    fn run_event(
        &mut self,
        ctx: &mut EventCtx<'_>,
        p1: usize,
        p2: usize,
        kind: EventKind,
    ) -> Result<PairEventData> {
        match kind {
            EventKind::Core => self.run_core(ctx, p1, p2),
            EventKind::NbhoodIn => {
                self.captured.add(p1, p2);
                Ok(virtual_data(p1, p2))
            }
            EventKind::NbhoodOut => {
                self.captured.remove(p1, p2);
                Ok(virtual_data(p1, p2))
            }
            EventKind::Virtual => Ok(virtual_data(p1, p2)),
            other => Err(Error::Numeric(format!(
                "dumbbells {} asked to run a {other:?} event for particles {p1} and {p2}",
                self.name
            ))),
        }
    }

    fn validate_state(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Option<String> {
        let (rij, _) = ctx.pair_separation(p1, p2);
        let overlapping = rij.norm_sq() < self.max_dist2();
        let captured = self.captured.contains(p1, p2);
        if overlapping != captured {
            Some(format!(
                "dumbbell pair {p1},{p2}: bounding spheres {} but pair is {} the capture map",
                if overlapping { "intersect" } else { "are apart" },
                if captured { "in" } else { "not in" },
            ))
        } else {
            None
        }
    }

    fn capture_test(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> bool {
        let (rij, _) = ctx.pair_separation(p1, p2);
        rij.norm_sq() < self.max_dist2()
    }

    fn initialise_capture(&mut self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) {
        if self.capture_test(ctx, p1, p2) {
            self.captured.add(p1, p2);
        }
    }

    fn capture_map(&self) -> Option<&CaptureMap> {
        Some(&self.captured)
    }

    fn capture_map_mut(&mut self) -> Option<&mut CaptureMap> {
        Some(&mut self.captured)
    }

    fn output_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("Interaction")
            .attr("Type", "Dumbbells")
            .attr("DiameterA", self.diam_a)
            .attr("DiameterB", self.diam_b)
            .attr("LA", self.la)
            .attr("LB", self.lb)
            .attr("Elasticity", self.elasticity)
            .attr("Name", &self.name);
        if let Some(dim) = self.unused_dimension {
            node = node.attr("UnusedDimension", dim);
        }
        let mut capture = XmlNode::new("CaptureMap");
        for (id1, id2) in self.captured.sorted_pairs() {
            capture = capture.child(
                XmlNode::new("Pair")
                    .attr("ID1", id1)
                    .attr("ID2", id2)
                    .attr("State", 1),
            );
        }
        node.child(capture)
    }
}

fn virtual_data(p1: usize, p2: usize) -> PairEventData {
    PairEventData {
        p1,
        p2,
        kind: EventKind::Virtual,
        rij: Vec3::zero(),
        impulse: Vec3::zero(),
        delta_ke: 0.0,
        delta_u: 0.0,
    }
}

impl Dumbbells {
    fn run_core(&mut self, ctx: &mut EventCtx<'_>, p1: usize, p2: usize) -> Result<PairEventData> {
        ctx.dynamics.update_particle_pair(
            ctx.boundary,
            ctx.particles,
            p1,
            p2,
            ctx.system_time,
        );
        let (rij, vij) = ctx.boundary.separation(
            ctx.particles[p1].pos - ctx.particles[p2].pos,
            ctx.particles[p1].vel - ctx.particles[p2].vel,
            ctx.system_time,
        );

        let (director1, angvel1) = {
            let rot = ctx
                .dynamics
                .rot_data(p1)
                .ok_or_else(|| Error::Numeric(format!("particle {p1} has no orientation data")))?;
            (rot.director(), rot.angular_velocity)
        };
        let (director2, angvel2) = {
            let rot = ctx
                .dynamics
                .rot_data(p2)
                .ok_or_else(|| Error::Numeric(format!("particle {p2} has no orientation data")))?;
            (rot.director(), rot.angular_velocity)
        };

        // Pick the sphere pairing closest to contact.
        let mut chosen = (self.la, self.diam_a, self.la, self.diam_a);
        let mut min_miss = f64::INFINITY;
        for (l1, d1, l2, d2) in self.pairings() {
            let miss =
                (0.5 * (d1 + d2) - (rij + director1 * l1 - director2 * l2).norm()).abs();
            if miss < min_miss {
                min_miss = miss;
                chosen = (l1, d1, l2, d2);
            }
        }
        let (l1, d1, l2, d2) = chosen;

        let u1 = director1 * l1;
        let u2 = director2 * l2;
        let nhat = (rij + u1 - u2).normalized().ok_or_else(|| {
            Error::Numeric(format!(
                "degenerate dumbbell contact normal for particles {p1} and {p2}"
            ))
        })?;
        let r1 = u1 - nhat * (0.5 * d1);
        let r2 = u2 + nhat * (0.5 * d2);

        let (m1, m2) = (ctx.properties.mass(p1), ctx.properties.mass(p2));
        let (i1, i2) = (ctx.properties.inertia(p1), ctx.properties.inertia(p2));

        let vc12 = vij + angvel1.cross(r1) - angvel2.cross(r2);
        let denom = 1.0 / m1
            + 1.0 / m2
            + nhat.dot(u1.cross(nhat).cross(u1) * (1.0 / i1) + u2.cross(nhat).cross(u2) * (1.0 / i2));
        let j = (1.0 + self.elasticity) * nhat.dot(vc12) / denom;
        let impulse = nhat * j;

        let ke_before = ctx.particles[p1].kinetic_energy(m1)
            + ctx.particles[p2].kinetic_energy(m2)
            + 0.5 * i1 * angvel1.norm_sq()
            + 0.5 * i2 * angvel2.norm_sq();

        ctx.particles[p1].vel -= impulse / m1;
        ctx.particles[p2].vel += impulse / m2;
        if let Some(rot) = ctx.dynamics.rot_data_mut(p1) {
            rot.angular_velocity -= r1.cross(impulse) / i1;
        }
        if let Some(rot) = ctx.dynamics.rot_data_mut(p2) {
            rot.angular_velocity += r2.cross(impulse) / i2;
        }

        if let Some(dim) = self.unused_dimension {
            ctx.particles[p1].vel[dim] = 0.0;
            ctx.particles[p2].vel[dim] = 0.0;
            for pid in [p1, p2] {
                if let Some(rot) = ctx.dynamics.rot_data_mut(pid) {
                    rot.angular_velocity[(dim + 1) % 3] = 0.0;
                    rot.angular_velocity[(dim + 2) % 3] = 0.0;
                }
            }
        }

        let (w1, w2) = (
            ctx.dynamics.rot_data(p1).map(|r| r.angular_velocity).unwrap_or(Vec3::zero()),
            ctx.dynamics.rot_data(p2).map(|r| r.angular_velocity).unwrap_or(Vec3::zero()),
        );
        let ke_after = ctx.particles[p1].kinetic_energy(m1)
            + ctx.particles[p2].kinetic_energy(m2)
            + 0.5 * i1 * w1.norm_sq()
            + 0.5 * i2 * w2.norm_sq();

        Ok(PairEventData {
            p1,
            p2,
            kind: EventKind::Core,
            rij,
            impulse,
            delta_ke: ke_after - ke_before,
            delta_u: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bc::{Boundary, BoundaryKind};
    use crate::core::dynamics::Dynamics;
    use crate::core::particle::Particle;
    use crate::core::properties::Properties;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn boundary() -> Boundary {
        Boundary::new(BoundaryKind::Rectangular, Vec3::new(50.0, 50.0, 50.0)).unwrap()
    }

    #[test]
    fn uncaptured_pair_predicts_neighbourhood_entry() -> Result<()> {
        let bc = boundary();
        let dynamics = Dynamics::with_rotation(2);
        let properties = Properties::uniform(1.0).unwrap();
        let particles = vec![
            Particle::new(0, Vec3::new(-4.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))?,
            Particle::new(1, Vec3::new(4.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0))?,
        ];
        let db = Dumbbells::new("rods", 0.5, 0.5, 0.5, 0.5, 1.0)?;
        let ctx = PredictCtx {
            particles: &particles,
            boundary: &bc,
            dynamics: &dynamics,
            properties: &properties,
            system_time: 0.0,
        };
        let ev = db.get_event(&ctx, 0, 1)?;
        assert_eq!(ev.kind, EventKind::NbhoodIn);
        // Bounding diameter 1.5: gap 8 - 1.5 = 6.5, closing speed 2.
        assert_relative_eq!(ev.dt, 3.25, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn neighbourhood_events_maintain_the_capture_map() -> Result<()> {
        let bc = boundary();
        let mut dynamics = Dynamics::with_rotation(2);
        let properties = Properties::uniform(1.0).unwrap();
        let mut particles = vec![
            Particle::new(0, Vec3::new(-0.7, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))?,
            Particle::new(1, Vec3::new(0.7, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0))?,
        ];
        let mut db = Dumbbells::new("rods", 0.5, 0.5, 0.5, 0.5, 1.0)?;
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = EventCtx {
            particles: &mut particles,
            boundary: &bc,
            dynamics: &mut dynamics,
            properties: &properties,
            system_time: 0.0,
            rng: &mut rng,
        };
        let data = db.run_event(&mut ctx, 0, 1, EventKind::NbhoodIn)?;
        assert_eq!(data.kind, EventKind::Virtual);
        assert!(db.capture_map().unwrap().contains(0, 1));
        db.run_event(&mut ctx, 0, 1, EventKind::NbhoodOut)?;
        assert!(!db.capture_map().unwrap().contains(0, 1));
        Ok(())
    }

    #[test]
    fn aligned_core_collision_conserves_momentum_and_energy() -> Result<()> {
        let bc = boundary();
        // Directors along +z, dumbbells approaching along x: the A spheres
        // (at +0.5 z) collide like smooth spheres.
        let mut dynamics = Dynamics::with_rotation(2);
        let properties = Properties::uniform(1.0).unwrap();
        let mut particles = vec![
            Particle::new(0, Vec3::new(-0.25, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))?,
            Particle::new(1, Vec3::new(0.25, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0))?,
        ];
        let mut db = Dumbbells::new("rods", 0.5, 0.5, 0.5, 0.5, 1.0)?;
        db.captured.add(0, 1);
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = EventCtx {
            particles: &mut particles,
            boundary: &bc,
            dynamics: &mut dynamics,
            properties: &properties,
            system_time: 0.0,
            rng: &mut rng,
        };
        let data = db.run_event(&mut ctx, 0, 1, EventKind::Core)?;
        assert_eq!(data.kind, EventKind::Core);
        // Elastic: energy conserved, momentum exchanged along x.
        assert_relative_eq!(data.delta_ke, 0.0, epsilon = 1e-10);
        let total_px = ctx.particles[0].vel.x + ctx.particles[1].vel.x;
        assert_relative_eq!(total_px, 0.0, epsilon = 1e-12);
        Ok(())
    }
}
