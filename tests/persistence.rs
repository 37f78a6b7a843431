//! Configuration save/load round trips.

use edmd::core::globals::{GCells, GSleep};
use edmd::core::interactions::{Interaction, SquareWell};
use edmd::core::locals::LWall;
use edmd::core::systems::{AndersenThermostat, SysTicker};
use edmd::core::{
    Boundary, BoundaryKind, IdRange, Particle, Properties, RunConditions, Simulation, Vec3,
};
use edmd::error::Result;
use edmd::io::xml::{load_config, save_config};

fn full_featured_sim() -> Result<Simulation> {
    let boundary = Boundary::new(BoundaryKind::Periodic, Vec3::new(12.0, 12.0, 12.0))?;
    let mut particles = vec![
        Particle::new(0, Vec3::new(-3.0, 0.0, 0.0), Vec3::new(0.5, 0.1, 0.0))?,
        Particle::new(1, Vec3::new(-1.6, 0.0, 0.0), Vec3::new(-0.25, 0.0, 0.125))?,
        Particle::new(2, Vec3::new(3.0, 3.0, 3.0), Vec3::zero())?,
    ];
    particles[2].clear_state(edmd::core::particle::DYNAMIC);

    let mut sim = Simulation::new(particles, boundary, Properties::uniform(2.0)?, Some(31))?;
    sim.add_interaction(Box::new(SquareWell::new("well", 1.0, 1.5, 0.25, 1.0)?));
    sim.add_global(Box::new(GCells::new("cells")));
    sim.add_global(Box::new(GSleep::new("sleeper", IdRange::All, 0.04)?));
    sim.add_local(Box::new(LWall::new(
        "floor",
        Vec3::new(0.0, -6.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        0.9,
        IdRange::All,
    )?));
    sim.add_system(Box::new(AndersenThermostat::new(
        "thermostat",
        IdRange::All,
        2.0,
        1.5,
    )?));
    sim.add_system(Box::new(SysTicker::new("tick", 0.5)?));
    Ok(sim)
}

/// Save, reload, save again: the two documents must be byte-identical.
#[test]
fn save_load_save_is_byte_identical() -> Result<()> {
    let sim = full_featured_sim()?;
    let first = save_config(&sim)?;
    let reloaded = load_config(&first, Some(31))?;
    let second = save_config(&reloaded)?;
    assert_eq!(first, second);
    Ok(())
}

/// The reloaded simulation preserves particle state, the static flag and
/// plugin parameters.
#[test]
fn reload_preserves_particles_and_plugins() -> Result<()> {
    let sim = full_featured_sim()?;
    let doc = save_config(&sim)?;
    let back = load_config(&doc, None)?;

    assert_eq!(back.num_particles(), 3);
    for (a, b) in sim.particles.iter().zip(&back.particles) {
        assert_eq!(a.pos, b.pos);
        assert_eq!(a.vel, b.vel);
        assert_eq!(a.is_dynamic(), b.is_dynamic());
    }
    assert_eq!(back.interactions.len(), 1);
    assert_eq!(back.globals.len(), 2);
    assert_eq!(back.locals.len(), 1);
    assert_eq!(back.systems.len(), 2);
    assert!((back.properties.mass(0) - 2.0).abs() < 1e-15);
    Ok(())
}

/// Capture maps survive the round trip: a captured pair stays captured
/// after reload, without re-deriving it from geometry.
#[test]
fn capture_map_round_trips() -> Result<()> {
    let mut sim = full_featured_sim()?;
    if let Some(map) = sim.interactions[0].capture_map_mut() {
        map.add(0, 1);
    }
    let doc = save_config(&sim)?;
    assert!(doc.contains("Pair"));

    let back = load_config(&doc, None)?;
    let map = back.interactions[0].capture_map().expect("capture map");
    assert!(map.contains(0, 1));
    assert_eq!(map.len(), 1);
    Ok(())
}

/// A reloaded configuration is runnable and produces events.
#[test]
fn reloaded_simulation_runs() -> Result<()> {
    let sim = full_featured_sim()?;
    let doc = save_config(&sim)?;
    let mut back = load_config(&doc, Some(5))?;
    back.initialise()?;
    back.run(RunConditions::until(1.0))?;
    assert!(back.system_time() >= 1.0);
    Ok(())
}

/// Rigid dumbbells round trip with their geometry and planar constraint.
#[test]
fn dumbbell_parameters_round_trip() -> Result<()> {
    use edmd::core::interactions::Dumbbells;

    let boundary = Boundary::new(BoundaryKind::Periodic, Vec3::new(20.0, 20.0, 20.0))?;
    let particles = vec![
        Particle::new(0, Vec3::new(-2.0, 0.0, 0.0), Vec3::new(0.1, 0.0, 0.0))?,
        Particle::new(1, Vec3::new(2.0, 0.0, 0.0), Vec3::new(-0.1, 0.0, 0.0))?,
    ];
    let mut sim = Simulation::new(particles, boundary, Properties::uniform(1.0)?, Some(2))?;
    sim.add_interaction(Box::new(
        Dumbbells::new("rods", 0.5, 0.75, 0.5, 0.25, 0.95)?.with_unused_dimension(2),
    ));
    sim.add_global(Box::new(GCells::new("cells")));

    let doc = save_config(&sim)?;
    let back = load_config(&doc, None)?;
    let redoc = save_config(&back)?;
    assert_eq!(doc, redoc);
    assert!(doc.contains("DiameterA"));
    assert!(doc.contains("UnusedDimension"));
    Ok(())
}

/// Configuration failures are fatal with a useful message.
#[test]
fn malformed_configurations_are_rejected() {
    assert!(load_config("<NotASimulation/>", None).is_err());
    assert!(load_config("<Simulation></Simulation>", None).is_err());

    let unknown_plugin = r#"
        <Simulation>
          <ParticleData><Pt ID="0"><P x="0" y="0" z="0"/><V x="0" y="0" z="0"/></Pt></ParticleData>
          <Dynamics>
            <Interactions><Interaction Type="Magic" Name="m"/></Interactions>
            <BC Type="Periodic" SizeX="10" SizeY="10" SizeZ="10"/>
            <Liouvillean Type="Newtonian"/>
          </Dynamics>
        </Simulation>"#;
    let err = load_config(unknown_plugin, None).unwrap_err();
    assert!(err.to_string().contains("Magic"));
}
