//! Resting-lattice scenario.
//!
//! A cube seeded exactly at rest spacing with gravity disabled. The density
//! estimate should settle at the rest density and the lattice should stay
//! put; any drift points at the constraint projection or at asymmetries in
//! the neighbor list.

use crate::harness::{create_particle_block, ScenarioConfig};
use nalgebra::vector;
use ripple::solver::SolverConfig;

#[derive(Clone, Debug)]
pub struct RestingLatticeParams {
    pub per_axis: u32,
    pub particle_radius: f32,
    pub total_steps: usize,
}

impl Default for RestingLatticeParams {
    fn default() -> Self {
        Self {
            per_axis: 12,
            particle_radius: 0.01,
            total_steps: 60,
        }
    }
}

pub fn resting_lattice_scenario(params: RestingLatticeParams) -> ScenarioConfig {
    let spacing = params.particle_radius * 2.0;
    let half = spacing * params.per_axis as f32 / 2.0;
    let particles = create_particle_block(
        vector![0.5, 0.5, 0.5],
        vector![half, half, half],
        spacing,
    );

    ScenarioConfig {
        name: "resting_lattice".to_string(),
        particles,
        boundary_payload: None,
        solver: SolverConfig {
            gravity: vector![0.0, 0.0, 0.0],
            dt: 1.0 / 300.0,
            particle_radius: params.particle_radius,
            xsph_coeff: 0.0,
            vorticity_coeff: 0.0,
            cohesion_coeff: 0.0,
            ..SolverConfig::default()
        },
        search_radius: spacing * 4.0,
        particle_capacity: 8192,
        total_steps: params.total_steps,
        snapshot_interval: 5,
    }
}
