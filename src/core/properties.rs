use crate::error::{Error, Result};

/// A per-particle numeric attribute: either one value shared by every
/// particle or an explicit per-id table.
#[derive(Debug, Clone)]
pub enum Property {
    Uniform(f64),
    PerParticle(Vec<f64>),
}

impl Property {
    #[inline]
    pub fn get(&self, id: usize) -> f64 {
        match self {
            Property::Uniform(v) => *v,
            Property::PerParticle(v) => v[id],
        }
    }
}

/// Numeric attributes of the particle population.
#[derive(Debug, Clone)]
pub struct Properties {
    pub mass: Property,
    /// Scalar moment of inertia, used by rigid-body interactions.
    pub inertia: Property,
}

impl Properties {
    pub fn uniform(mass: f64) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        Ok(Self {
            mass: Property::Uniform(mass),
            inertia: Property::Uniform(1.0),
        })
    }

    #[inline]
    pub fn mass(&self, id: usize) -> f64 {
        self.mass.get(id)
    }

    #[inline]
    pub fn inertia(&self, id: usize) -> f64 {
        self.inertia.get(id)
    }

    /// Reduced mass of a pair.
    #[inline]
    pub fn reduced_mass(&self, p1: usize, p2: usize) -> f64 {
        let (m1, m2) = (self.mass(p1), self.mass(p2));
        m1 * m2 / (m1 + m2)
    }
}
