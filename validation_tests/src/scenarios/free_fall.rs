//! Free-fall scenario.
//!
//! A cube of fluid seeded high in the domain falls under gravity with no
//! boundary field loaded: the ε-clamped domain floor is the only obstacle.
//! Expected behavior: the vertical center of mass decreases monotonically
//! until floor contact, and no particle ever leaves the open unit cube.

use crate::harness::{create_particle_block, ScenarioConfig};
use nalgebra::vector;
use ripple::solver::SolverConfig;

/// Parameters for the free-fall test.
#[derive(Clone, Debug)]
pub struct FreeFallParams {
    /// Cube side length.
    pub side: f32,
    /// Initial height of the cube center.
    pub center_y: f32,
    /// Particles per cube axis.
    pub per_axis: u32,
    /// Gravity magnitude (m/s²).
    pub gravity: f32,
    pub dt: f32,
    pub total_steps: usize,
}

impl Default for FreeFallParams {
    fn default() -> Self {
        Self {
            side: 0.2,
            center_y: 0.8,
            per_axis: 10,
            gravity: 9.8,
            dt: 1.0 / 300.0,
            total_steps: 100,
        }
    }
}

pub fn free_fall_scenario(params: FreeFallParams) -> ScenarioConfig {
    let spacing = params.side / params.per_axis as f32;
    let particles = create_particle_block(
        vector![0.5, params.center_y, 0.5],
        vector![params.side / 2.0, params.side / 2.0, params.side / 2.0],
        spacing,
    );

    ScenarioConfig {
        name: "free_fall".to_string(),
        particles,
        boundary_payload: None,
        solver: SolverConfig {
            gravity: vector![0.0, -params.gravity, 0.0],
            dt: params.dt,
            particle_radius: spacing / 2.0,
            ..SolverConfig::default()
        },
        search_radius: spacing * 2.0,
        particle_capacity: 8192,
        total_steps: params.total_steps,
        snapshot_interval: 1,
    }
}
