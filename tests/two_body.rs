//! Small deterministic collision scenarios with exactly known outcomes.

use edmd::core::interactions::HardSphere;
use edmd::core::{
    Boundary, BoundaryKind, Particle, Properties, RunConditions, Simulation, Vec3,
};
use edmd::error::Result;

fn collinear_spheres(positions: &[f64], velocities: &[f64]) -> Result<Simulation> {
    let particles = positions
        .iter()
        .zip(velocities)
        .enumerate()
        .map(|(i, (&x, &v))| {
            Particle::new(i, Vec3::new(x, 0.0, 0.0), Vec3::new(v, 0.0, 0.0))
        })
        .collect::<Result<Vec<_>>>()?;
    let boundary = Boundary::new(BoundaryKind::Rectangular, Vec3::new(100.0, 100.0, 100.0))?;
    let mut sim = Simulation::new(particles, boundary, Properties::uniform(1.0)?, Some(1))?;
    sim.add_interaction(Box::new(HardSphere::new("bulk", 1.0, 1.0)?));
    sim.initialise()?;
    Ok(sim)
}

/// Two unit spheres head-on from +-2 at speed 1: contact at t = 1.5,
/// velocities exchange, kinetic energy stays exactly 1.
#[test]
fn head_on_pair_collides_at_the_analytic_time() -> Result<()> {
    let mut sim = collinear_spheres(&[-2.0, 2.0], &[1.0, -1.0])?;
    assert!((sim.kinetic_energy() - 1.0).abs() < 1e-12);

    sim.run(RunConditions::events(1))?;

    assert!(
        (sim.system_time() - 1.5).abs() < 1e-12,
        "collision time {}",
        sim.system_time()
    );
    assert!((sim.particles[0].vel.x + 1.0).abs() < 1e-12);
    assert!((sim.particles[1].vel.x - 1.0).abs() < 1e-12);
    assert!((sim.kinetic_energy() - 1.0).abs() < 1e-12);
    assert_eq!(sim.event_count(), 1);

    // The pair sits exactly at contact after the core event.
    sim.update_all_particles();
    let gap = (sim.particles[0].pos - sim.particles[1].pos).norm();
    assert!((gap - 1.0).abs() < 1e-10, "post-collision separation {gap}");
    Ok(())
}

/// A pair starting exactly at contact and approaching produces a zero-time
/// event that is processed, not rejected.
#[test]
fn contact_pair_processes_a_zero_time_event() -> Result<()> {
    let mut sim = collinear_spheres(&[-0.5, 0.5], &[1.0, -1.0])?;
    sim.run(RunConditions::events(1))?;
    assert!(sim.system_time().abs() < 1e-12);
    assert!((sim.particles[0].vel.x + 1.0).abs() < 1e-12);
    assert!((sim.particles[1].vel.x - 1.0).abs() < 1e-12);
    Ok(())
}

/// Newton's cradle: the momentum hops down the line in three core events
/// at strictly increasing times, leaving only the last sphere moving.
#[test]
fn newtons_cradle_transfers_momentum_down_the_line() -> Result<()> {
    let mut sim = collinear_spheres(&[0.0, 2.0, 4.0, 6.0], &[1.0, 0.0, 0.0, 0.0])?;

    let mut times = Vec::new();
    for _ in 0..3 {
        let before = sim.event_count();
        while sim.event_count() == before {
            sim.run_next_event()?;
        }
        times.push(sim.system_time());
    }

    assert_eq!(sim.event_count(), 3);
    for w in times.windows(2) {
        assert!(w[0] < w[1], "event times not increasing: {times:?}");
    }
    for (i, p) in sim.particles.iter().take(3).enumerate() {
        assert!(
            p.vel.x.abs() < 1e-12,
            "sphere {i} still moving at {}",
            p.vel.x
        );
    }
    assert!((sim.particles[3].vel.x - 1.0).abs() < 1e-12);
    assert!((sim.kinetic_energy() - 0.5).abs() < 1e-12);
    Ok(())
}

/// Unequal masses exchange momentum exactly; the heavy target recoils and
/// the light projectile bounces back.
#[test]
fn unequal_mass_collision_conserves_momentum_exactly() -> Result<()> {
    let particles = vec![
        Particle::new(0, Vec3::new(-2.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0))?,
        Particle::new(1, Vec3::new(2.0, 0.0, 0.0), Vec3::zero())?,
    ];
    let boundary = Boundary::new(BoundaryKind::Rectangular, Vec3::new(100.0, 100.0, 100.0))?;
    let properties = Properties {
        mass: edmd::core::Property::PerParticle(vec![1.0, 3.0]),
        inertia: edmd::core::Property::Uniform(1.0),
    };
    let mut sim = Simulation::new(particles, boundary, properties, Some(1))?;
    sim.add_interaction(Box::new(HardSphere::new("bulk", 1.0, 1.0)?));
    sim.initialise()?;

    let p_before = sim.momentum();
    let e_before = sim.kinetic_energy();
    sim.run(RunConditions::events(1))?;

    assert!((sim.momentum() - p_before).norm() < 1e-14);
    assert!((sim.kinetic_energy() - e_before).abs() < 1e-12);
    // 1-on-3 elastic head-on: v1' = -1/2, v2' = +1/2.
    assert!((sim.particles[0].vel.x + 0.5).abs() < 1e-12);
    assert!((sim.particles[1].vel.x - 0.5).abs() < 1e-12);
    Ok(())
}
