use crate::core::context::{EventCtx, PredictCtx};
use crate::core::event::{EventKind, PairEventData, Prediction};
use crate::core::interactions::Interaction;
use crate::error::{Error, Result};
use crate::io::XmlNode;

/// The classic hard sphere: a single core collision at `diameter` with a
/// fixed elasticity.
#[derive(Debug, Clone)]
pub struct HardSphere {
    name: String,
    diameter: f64,
    d2: f64,
    elasticity: f64,
}

impl HardSphere {
    pub fn new(name: impl Into<String>, diameter: f64, elasticity: f64) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(Error::InvalidParam(
                "elasticity must lie in [0, 1]".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            diameter,
            d2: diameter * diameter,
            elasticity,
        })
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }
}

impl Interaction for HardSphere {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_int_dist(&self) -> f64 {
        self.diameter
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Result<Prediction> {
        let (rij, vij) = ctx.pair_separation(p1, p2);
        match ctx.dynamics.sphere_sphere_in_root(rij, vij, self.d2)? {
            Some(dt) => Ok(Prediction::new(dt, EventKind::Core)),
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
        if kind != EventKind::Core {
            return Err(Error::Numeric(format!(
                "hard sphere {} asked to run a {kind:?} event for particles {p1} and {p2}",
                self.name
            )));
        }
        ctx.dynamics.smooth_spheres_coll(
            ctx.boundary,
            ctx.properties,
            ctx.particles,
            p1,
            p2,
            ctx.system_time,
            self.elasticity,
            EventKind::Core,
        )
    }

    fn validate_state(&self, ctx: &PredictCtx<'_>, p1: usize, p2: usize) -> Option<String> {
        let (rij, _) = ctx.pair_separation(p1, p2);
        if ctx.dynamics.sphere_overlap(rij, self.d2) {
            Some(format!(
                "particles {p1} and {p2} overlap: |rij| = {:.12e}, diameter = {:.12e}",
                rij.norm(),
                self.diameter
            ))
        } else {
            None
        }
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("Interaction")
            .attr("Type", "HardSphere")
            .attr("Diameter", self.diameter)
            .attr("Elasticity", self.elasticity)
            .attr("Name", &self.name)
    }
}
