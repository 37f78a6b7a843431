//! Local events: fixed structures (walls, floors) that particles collide
//! with.

use crate::core::context::{EventCtx, InitCtx, PredictCtx};
use crate::core::event::{EventKind, ParticleEventData, Prediction};
use crate::core::math::Vec3;
use crate::core::particle::Particle;
use crate::core::ranges::IdRange;
use crate::error::{Error, Result};
use crate::io::XmlNode;

pub trait Local {
    fn name(&self) -> &str;

    fn initialise(&mut self, _ctx: &mut InitCtx<'_>) -> Result<()> {
        Ok(())
    }

    fn is_interaction(&self, p: &Particle) -> bool;

    fn get_event(&self, ctx: &PredictCtx<'_>, p: usize) -> Result<Prediction>;

    fn run_event(
        &mut self,
        ctx: &mut EventCtx<'_>,
        p: usize,
        kind: EventKind,
    ) -> Result<ParticleEventData>;

    /// Geometry consistency check at initialisation; returns a warning
    /// description when the particle is in an invalid state.
    fn validate_state(&self, ctx: &PredictCtx<'_>, p: usize) -> Option<String>;

    fn output_xml(&self) -> XmlNode;
}

/// A smooth planar wall through `origin` with inward normal `normal`.
#[derive(Debug, Clone)]
pub struct LWall {
    name: String,
    origin: Vec3,
    normal: Vec3,
    elasticity: f64,
    range: IdRange,
}

impl LWall {
    pub fn new(
        name: impl Into<String>,
        origin: Vec3,
        normal: Vec3,
        elasticity: f64,
        range: IdRange,
    ) -> Result<Self> {
        let normal = normal.normalized().ok_or_else(|| {
            Error::InvalidParam("wall normal must have nonzero length".into())
        })?;
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(Error::InvalidParam("elasticity must lie in [0, 1]".into()));
        }
        Ok(Self {
            name: name.into(),
            origin,
            normal,
            elasticity,
            range,
        })
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }
}

impl Local for LWall {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_interaction(&self, p: &Particle) -> bool {
        self.range.contains(p.id, usize::MAX)
    }

    fn get_event(&self, ctx: &PredictCtx<'_>, p: usize) -> Result<Prediction> {
        let dt = ctx.dynamics.get_wall_collision(
            ctx.boundary,
            &ctx.particles[p],
            ctx.system_time,
            self.origin,
            self.normal,
        );
        Ok(Prediction::new(dt, EventKind::Wall))
    }

    fn run_event(
        &mut self,
        ctx: &mut EventCtx<'_>,
        p: usize,
        kind: EventKind,
    ) -> Result<ParticleEventData> {
        if kind != EventKind::Wall {
            return Err(Error::Numeric(format!(
                "wall {} asked to run a {kind:?} event for particle {p}",
                self.name
            )));
        }
        Ok(ctx.dynamics.run_wall_collision(
            ctx.boundary,
            ctx.properties,
            &mut ctx.particles[p],
            ctx.system_time,
            self.normal,
            self.elasticity,
        ))
    }

    fn validate_state(&self, ctx: &PredictCtx<'_>, p: usize) -> Option<String> {
        let depth = (ctx.particles[p].pos - self.origin).dot(self.normal);
        if depth < 0.0 {
            Some(format!(
                "particle {p} is behind wall {}: depth {depth:.12e}",
                self.name
            ))
        } else {
            None
        }
    }

    fn output_xml(&self) -> XmlNode {
        XmlNode::new("Local")
            .attr("Type", "Wall")
            .attr("Name", &self.name)
            .attr("Elasticity", self.elasticity)
            .child(
                XmlNode::new("Origin")
                    .attr("x", self.origin.x)
                    .attr("y", self.origin.y)
                    .attr("z", self.origin.z),
            )
            .child(
                XmlNode::new("Normal")
                    .attr("x", self.normal.x)
                    .attr("y", self.normal.y)
                    .attr("z", self.normal.z),
            )
    }
}
