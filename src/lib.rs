//! edmd: an event-driven molecular dynamics engine.
//!
//! Time advances by leaping from one discrete event to the next: hard
//! sphere and square-well collisions, dumbbell contacts, wall bounces,
//! neighbour-cell transitions, thermostat kicks and ticker pulses. The
//! scheduler keeps a future event list over per-particle event slots with
//! lazy deletion; the dynamics layer streams particles ballistically and
//! solves closed-form collision times.
//!
//! The optional `python` feature exposes a small numpy-friendly class for
//! driving the engine from analysis scripts.

pub mod core;
pub mod error;
pub mod io;

#[cfg(feature = "python")]
mod python {
    use crate::core::math::Vec3;
    use crate::core::sim::Simulation;
    use numpy::ndarray::Array2;
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    fn py_err<E: ToString>(e: E) -> PyErr {
        PyValueError::new_err(e.to_string())
    }

    /// Python-facing wrapper around the Rust simulation core. The engine
    /// is single-threaded by design, so the class is pinned to the thread
    /// that created it.
    #[pyclass(unsendable)]
    pub struct EdmdSim {
        sim: Simulation,
    }

    #[pymethods]
    impl EdmdSim {
        /// Initialize a periodic hard-sphere gas.
        ///
        /// Parameters
        /// - num_particles: number of particles (int, > 0)
        /// - box_size: iterable of 3 positive floats [Lx, Ly, Lz]
        /// - diameter: sphere diameter (float, > 0)
        /// - mass: particle mass (float, > 0)
        /// - seed: RNG seed (int) for reproducibility; None for nondeterministic
        #[new]
        #[pyo3(signature = (num_particles, box_size, diameter=1.0, mass=1.0, seed=None))]
        fn new(
            num_particles: usize,
            box_size: Vec<f64>,
            diameter: f64,
            mass: f64,
            seed: Option<u64>,
        ) -> PyResult<Self> {
            if box_size.len() != 3 {
                return Err(py_err("box_size must have length 3"));
            }
            let mut sim = Simulation::hard_sphere_gas(
                num_particles,
                Vec3::new(box_size[0], box_size[1], box_size[2]),
                diameter,
                mass,
                seed,
            )
            .map_err(py_err)?;
            sim.initialise().map_err(py_err)?;
            Ok(Self { sim })
        }

        /// Load a simulation from an XML configuration file.
        #[staticmethod]
        #[pyo3(signature = (path, seed=None))]
        fn load(path: String, seed: Option<u64>) -> PyResult<Self> {
            let mut sim = crate::io::xml::load_config_file(&path, seed).map_err(py_err)?;
            sim.initialise().map_err(py_err)?;
            Ok(Self { sim })
        }

        /// Save the configuration to an XML file.
        fn save(&mut self, path: String) -> PyResult<()> {
            self.sim.update_all_particles();
            crate::io::xml::save_config_file(&self.sim, &path).map_err(py_err)
        }

        /// Advance the simulation to the specified absolute time (releases
        /// the GIL during computation).
        fn advance_to(&mut self, py: Python<'_>, target_time: f64) -> PyResult<()> {
            py.detach(|| self.sim.advance_to(target_time)).map_err(py_err)
        }

        /// Process the given number of events (releases the GIL).
        fn run_events(&mut self, py: Python<'_>, n: u64) -> PyResult<()> {
            py.detach(|| self.sim.run_events(n)).map_err(py_err)
        }

        fn time(&self) -> f64 {
            self.sim.system_time()
        }

        fn event_count(&self) -> u64 {
            self.sim.event_count()
        }

        fn kinetic_energy(&self) -> f64 {
            self.sim.kinetic_energy()
        }

        fn kinetic_temperature(&self) -> f64 {
            self.sim.kinetic_temperature()
        }

        /// Return positions as a NumPy array of shape (N, 3), dtype=float64.
        fn get_positions<'py>(&mut self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
            self.sim.update_all_particles();
            let n = self.sim.num_particles();
            let mut arr = Array2::<f64>::zeros((n, 3));
            for (i, p) in self.sim.particles.iter().enumerate() {
                for k in 0..3 {
                    arr[[i, k]] = p.pos[k];
                }
            }
            Ok(arr.into_pyarray(py).to_owned().into())
        }

        /// Return velocities as a NumPy array of shape (N, 3), dtype=float64.
        fn get_velocities<'py>(&mut self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
            self.sim.update_all_particles();
            let n = self.sim.num_particles();
            let mut arr = Array2::<f64>::zeros((n, 3));
            for (i, p) in self.sim.particles.iter().enumerate() {
                for k in 0..3 {
                    arr[[i, k]] = p.vel[k];
                }
            }
            Ok(arr.into_pyarray(py).to_owned().into())
        }

        /// Set all particle velocities from a NumPy array of shape (N, 3).
        fn set_velocities<'py>(&mut self, velocities: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
            let arr = velocities.as_array();
            let n = self.sim.num_particles();
            if arr.shape() != [n, 3] {
                return Err(py_err(format!(
                    "velocities must have shape ({n}, 3), got {:?}",
                    arr.shape()
                )));
            }
            for i in 0..n {
                for k in 0..3 {
                    let val = arr[[i, k]];
                    if !val.is_finite() {
                        return Err(py_err("velocity values must be finite"));
                    }
                    self.sim.particles[i].vel[k] = val;
                }
            }
            self.sim.initialise().map_err(py_err)
        }
    }

    /// The edmd Python module entry point.
    #[pymodule]
    fn edmd(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<EdmdSim>()?;
        Ok(())
    }
}
