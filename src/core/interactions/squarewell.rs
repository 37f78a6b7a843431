use crate::core::capture::CaptureMap;
use crate::core::context::{EventCtx, PredictCtx};
use crate::core::event::{EventKind, PairEventData, Prediction};
use crate::core::interactions::Interaction;
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// A square-well interaction: a hard core at `diameter` surrounded by an
/// attractive shell of depth `well_depth` reaching to `lambda * diameter`.
///
/// Pairs inside the shell are tracked in the capture map. Crossing the
/// shell exchanges kinetic and potential energy; a pair without the energy
/// to leave bounces off the inside of the shell instead.
#[derive(Debug, Clone)]
pub struct SquareWell {
    name: String,
    diameter: f64,
    d2: f64,
    lambda: f64,
    ld2: f64,
    well_depth: f64,
    elasticity: f64,
    captured: CaptureMap,
}

impl SquareWell {
    pub fn new(
        name: impl Into<String>,
        diameter: f64,
        lambda: f64,
        well_depth: f64,
        elasticity: f64,
    ) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        if !lambda.is_finite() || lambda <= 1.0 {
            return Err(Error::InvalidParam(
                "well width ratio lambda must be > 1".into(),
            ));
        }
        if !well_depth.is_finite() {
            return Err(Error::InvalidParam("well depth must be finite".into()));
        }
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(Error::InvalidParam("elasticity must lie in [0, 1]".into()));
        }
        let ld = lambda * diameter;
        Ok(Self {
            name: name.into(),
            diameter,
            d2: diameter * diameter,
            lambda,
            ld2: ld * ld,
            well_depth,
            elasticity,
            captured: CaptureMap::new(),
        })
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn well_depth(&self) -> f64 {
        self.well_depth
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }
}

impl Interaction for SquareWell {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_int_dist(&self) -> f64 {
        self.lambda * self.diameter
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Result<Prediction> {
        let (rij, vij) = ctx.pair_separation(p1, p2);

        if self.captured.contains(p1, p2) {
            // Inside the well: the core collision races the shell exit.
            if let Some(dt) = ctx.dynamics.sphere_sphere_in_root(rij, vij, self.d2)? {
                let exit = ctx.dynamics.sphere_sphere_out_root(rij, vij, self.ld2)?;
                return Ok(if dt < exit {
                    Prediction::new(dt, EventKind::Core)
                } else {
                    Prediction::new(exit, EventKind::WellKeDown)
                });
            }
            let exit = ctx.dynamics.sphere_sphere_out_root(rij, vij, self.ld2)?;
            return Ok(Prediction::new(exit, EventKind::WellKeDown));
        }

        match ctx.dynamics.sphere_sphere_in_root(rij, vij, self.ld2)? {
            Some(dt) => Ok(Prediction::new(dt, EventKind::WellKeUp)),
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
            EventKind::Core => ctx.dynamics.smooth_spheres_coll(
                ctx.boundary,
                ctx.properties,
                ctx.particles,
                p1,
                p2,
                ctx.system_time,
                self.elasticity,
                EventKind::Core,
            ),
            EventKind::WellKeUp => {
                let data = ctx.dynamics.sphere_well_event(
                    ctx.boundary,
                    ctx.properties,
                    ctx.particles,
                    p1,
                    p2,
                    ctx.system_time,
                    self.well_depth,
                )?;
                self.captured.add(p1, p2);
                Ok(data)
            }
            EventKind::WellKeDown => {
                let data = ctx.dynamics.sphere_well_event(
                    ctx.boundary,
                    ctx.properties,
                    ctx.particles,
                    p1,
                    p2,
                    ctx.system_time,
                    -self.well_depth,
                )?;
                // A bounce stays inside the well; a true crossing leaves it.
                if data.kind == EventKind::WellKeDown {
                    self.captured.remove(p1, p2);
                }
                Ok(data)
            }
            other => Err(Error::Numeric(format!(
                "square well {} asked to run a {other:?} event for particles {p1} and {p2}",
                self.name
            ))),
        }
    }

    fn validate_state(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Option<String> {
        let (rij, _) = ctx.pair_separation(p1, p2);
        let r2 = rij.norm_sq();
        let captured = self.captured.contains(p1, p2);
        if r2 < self.d2 {
            Some(format!(
                "particles {p1} and {p2} overlap the core: |rij| = {:.12e}, diameter = {:.12e}",
                rij.norm(),
                self.diameter
            ))
        } else if captured && r2 > self.ld2 {
            Some(format!(
                "captured pair {p1},{p2} lies outside the well: |rij| = {:.12e}",
                rij.norm()
            ))
        } else if !captured && r2 < self.ld2 {
            Some(format!(
                "uncaptured pair {p1},{p2} lies inside the well: |rij| = {:.12e}",
                rij.norm()
            ))
        } else {
            None
        }
    }

    fn capture_test(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> bool {
        let (rij, _) = ctx.pair_separation(p1, p2);
        rij.norm_sq() < self.ld2
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
            .attr("Type", "SquareWell")
            .attr("Diameter", self.diameter)
            .attr("Lambda", self.lambda)
            .attr("WellDepth", self.well_depth)
            .attr("Elasticity", self.elasticity)
            .attr("Name", &self.name);
        let mut capture = XmlNode::new("CaptureMap");
        for (id1, id2) in self.captured.sorted_pairs() {
            capture = capture.child(
                XmlNode::new("Pair")
                    .attr("ID1", id1)
                    .attr("ID2", id2)
                    .attr("State", 1),
            );
        }
        node = node.child(capture);
        node
    }
}
