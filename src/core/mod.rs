//! The event-driven molecular dynamics core: particle store, dynamics,
//! neighbour-list cells, the event queue and the scheduler.

pub mod bc;
pub mod capture;
pub mod cells;
pub mod context;
pub mod dynamics;
pub mod event;
pub mod fel;
pub mod globals;
pub mod interactions;
pub mod locals;
pub mod math;
pub mod morton;
pub mod particle;
pub mod pel;
pub mod properties;
pub mod ranges;
pub mod scheduler;
pub mod sim;
pub mod systems;

pub use bc::{Boundary, BoundaryKind};
pub use event::{Event, EventClass, EventKind, PairEventData, ParticleEventData, Prediction};
pub use math::{Quaternion, Vec3};
pub use particle::Particle;
pub use properties::{Properties, Property};
pub use ranges::IdRange;
pub use sim::{RunConditions, Simulation};
