//! Analytic checks over recorded trajectories.
//!
//! The solver scenarios here have known expected behavior (free fall before
//! floor contact, density settling toward rest density, domain containment),
//! so trajectories are checked against those expectations directly instead
//! of against a reference implementation.

use crate::harness::SimulationTrajectory;
use serde::{Deserialize, Serialize};

/// Summary statistics for one trajectory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    pub scenario: String,
    /// Vertical center of mass per snapshot.
    pub com_y_over_time: Vec<f32>,
    /// Mean density per snapshot.
    pub mean_density_over_time: Vec<f32>,
    /// Number of snapshots through which the vertical center of mass
    /// decreased monotonically from the start.
    pub monotonic_fall_snapshots: usize,
    /// Particle-snapshot pairs outside the open unit cube.
    pub domain_violations: usize,
    /// Mean density of the final snapshot.
    pub final_mean_density: f32,
}

impl TrajectoryMetrics {
    pub fn analyze(trajectory: &SimulationTrajectory) -> Self {
        let com_y_over_time: Vec<f32> = trajectory
            .snapshots
            .iter()
            .map(|s| {
                s.particles.iter().map(|p| p.position[1]).sum::<f32>()
                    / s.particles.len().max(1) as f32
            })
            .collect();

        let mean_density_over_time: Vec<f32> = trajectory
            .snapshots
            .iter()
            .map(|s| {
                s.particles.iter().map(|p| p.density).sum::<f32>()
                    / s.particles.len().max(1) as f32
            })
            .collect();

        let monotonic_fall_snapshots = com_y_over_time
            .windows(2)
            .take_while(|w| w[1] < w[0])
            .count();

        let domain_violations = trajectory
            .snapshots
            .iter()
            .flat_map(|s| s.particles.iter())
            .filter(|p| p.position.iter().any(|&x| !(0.0..1.0).contains(&x)))
            .count();

        Self {
            scenario: trajectory.name.clone(),
            final_mean_density: *mean_density_over_time.last().unwrap_or(&0.0),
            com_y_over_time,
            mean_density_over_time,
            monotonic_fall_snapshots,
            domain_violations,
        }
    }

    /// Human-readable report.
    pub fn report(&self) -> String {
        format!(
            "scenario: {}\n  snapshots: {}\n  monotonic fall: {} snapshots\n  \
             domain violations: {}\n  final mean density: {:.4}\n  final com.y: {:.4}",
            self.scenario,
            self.com_y_over_time.len(),
            self.monotonic_fall_snapshots,
            self.domain_violations,
            self.final_mean_density,
            self.com_y_over_time.last().unwrap_or(&0.0),
        )
    }
}
