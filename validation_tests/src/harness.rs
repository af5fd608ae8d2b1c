//! Headless simulation harness for validation runs.
//!
//! Runs solver scenarios without a renderer and extracts particle data for
//! analysis and export.

use nalgebra::Vector3;
use ripple::pipeline::{PbfData, PbfPipeline};
use ripple::solver::{Particle, ParticlePosition, SolverConfig};
use serde::{Deserialize, Serialize};
use slang_hal::backend::{Backend, WebGpu};
use slang_hal::{BufferUsages, SlangCompiler};
use std::path::Path;
use std::time::Instant;
use stensor::tensor::GpuVector;
use wgpu::Limits;

/// Recorded state of a single particle at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticleState {
    pub position: [f32; 3],
    /// Solver density estimate (rest density is 1), packed next to the
    /// position on the GPU.
    pub density: f32,
}

/// Recorded state of the entire simulation at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub time: f32,
    pub step: usize,
    pub particles: Vec<ParticleState>,
}

/// Complete trajectory of a simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationTrajectory {
    pub name: String,
    pub dt: f32,
    pub snapshots: Vec<SimulationSnapshot>,
    pub metadata: SimulationMetadata,
}

/// Metadata about the simulation setup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub num_particles: usize,
    pub search_radius: f32,
    pub particle_radius: f32,
    pub gravity: [f32; 3],
    pub constraint_iterations: u32,
}

impl SimulationTrajectory {
    /// Export trajectory to a JSON file.
    pub fn export_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Export trajectory to CSV files (one file per snapshot).
    pub fn export_csv(&self, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;

        for snapshot in &self.snapshots {
            let filename = format!("step_{:06}.csv", snapshot.step);
            let path = dir.join(filename);

            let mut wtr = csv::Writer::from_path(path)?;
            wtr.write_record(["particle_id", "x", "y", "z", "density"])?;

            for (i, p) in snapshot.particles.iter().enumerate() {
                wtr.write_record([
                    i.to_string(),
                    p.position[0].to_string(),
                    p.position[1].to_string(),
                    p.position[2].to_string(),
                    p.density.to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        Ok(())
    }

    /// Load a trajectory from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)?;
        let trajectory: SimulationTrajectory = serde_json::from_str(&json)?;
        Ok(trajectory)
    }
}

/// Configuration for a validation scenario.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub name: String,
    pub particles: Vec<Particle>,
    /// Optional boundary field payload (the same text format the solver
    /// loads at runtime).
    pub boundary_payload: Option<String>,
    pub solver: SolverConfig,
    pub search_radius: f32,
    pub particle_capacity: u32,
    pub total_steps: usize,
    pub snapshot_interval: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            particles: vec![],
            boundary_payload: None,
            solver: SolverConfig::default(),
            search_radius: 0.04,
            particle_capacity: 16_384,
            total_steps: 300,
            snapshot_interval: 1,
        }
    }
}

/// Headless simulation runner.
pub struct ValidationHarness {
    gpu: WebGpu,
    compiler: SlangCompiler,
}

impl ValidationHarness {
    /// Create a new harness with a GPU backend.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let limits = Limits {
            max_storage_buffers_per_shader_stage: 10,
            ..Limits::default()
        };
        let gpu = WebGpu::new(Default::default(), limits).await?;

        let mut compiler = SlangCompiler::default();
        ripple::register_shaders(&mut compiler);

        Ok(Self { gpu, compiler })
    }

    /// Run a scenario and record its trajectory.
    pub async fn run_scenario(
        &self,
        config: ScenarioConfig,
    ) -> Result<SimulationTrajectory, Box<dyn std::error::Error>> {
        let pipeline: PbfPipeline<WebGpu> = PbfPipeline::new(&self.gpu, &self.compiler)?;
        let mut data = PbfData::new(
            &self.gpu,
            config.solver,
            config.search_radius,
            config.particle_capacity,
        )
        .map_err(|e| e.to_string())?;
        data.set_particles(&self.gpu, &config.particles)
            .map_err(|e| e.to_string())?;
        if let Some(payload) = &config.boundary_payload {
            data.set_boundary_data(&self.gpu, payload)
                .map_err(|e| e.to_string())?;
        }

        let num_particles = config.particles.len();
        let mut positions_staging: GpuVector<ParticlePosition, WebGpu> = GpuVector::vector_uninit(
            &self.gpu,
            num_particles as u32,
            BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        )?;

        let mut snapshots = Vec::new();
        snapshots.push(
            self.extract_snapshot(&data, &mut positions_staging, 0, 0.0)
                .await?,
        );

        let mut current_time = 0.0;
        for step in 1..=config.total_steps {
            let step_start = Instant::now();
            let mut encoder = self.gpu.begin_encoding();
            pipeline.launch_step(&self.gpu, &mut encoder, &mut data)?;
            self.gpu.submit(encoder)?;
            self.gpu.synchronize()?;
            let step_time = step_start.elapsed();

            current_time += config.solver.dt;

            if step % config.snapshot_interval == 0 {
                snapshots.push(
                    self.extract_snapshot(&data, &mut positions_staging, step, current_time)
                        .await?,
                );
                log::info!(
                    "  step {}/{} ({:.2}ms/step)",
                    step,
                    config.total_steps,
                    step_time.as_secs_f64() * 1000.0
                );
            }
        }

        Ok(SimulationTrajectory {
            name: config.name,
            dt: config.solver.dt,
            snapshots,
            metadata: SimulationMetadata {
                num_particles,
                search_radius: config.search_radius,
                particle_radius: config.solver.particle_radius,
                gravity: config.solver.gravity.into(),
                constraint_iterations: config.solver.constraint_iterations,
            },
        })
    }

    /// Extract the current particle states from the GPU.
    async fn extract_snapshot(
        &self,
        data: &PbfData<WebGpu>,
        positions_staging: &mut GpuVector<ParticlePosition, WebGpu>,
        step: usize,
        time: f32,
    ) -> Result<SimulationSnapshot, Box<dyn std::error::Error>> {
        let num_particles = data.particles.len();

        let mut encoder = self.gpu.begin_encoding();
        positions_staging.copy_from_view(&mut encoder, data.positions())?;
        self.gpu.submit(encoder)?;
        self.gpu.synchronize()?;

        let mut positions = vec![ParticlePosition::zeros(); num_particles];
        self.gpu
            .read_buffer(positions_staging.buffer(), &mut positions)
            .await?;

        let particles: Vec<ParticleState> = positions
            .iter()
            .map(|p| ParticleState {
                position: [p.x, p.y, p.z],
                density: p.w,
            })
            .collect();

        Ok(SimulationSnapshot {
            time,
            step,
            particles,
        })
    }
}

/// Helper to seed a block of particles on a regular lattice.
pub fn create_particle_block(
    center: Vector3<f32>,
    half_extents: Vector3<f32>,
    spacing: f32,
) -> Vec<Particle> {
    let mut particles = vec![];

    let nx = (half_extents.x * 2.0 / spacing).round() as i32;
    let ny = (half_extents.y * 2.0 / spacing).round() as i32;
    let nz = (half_extents.z * 2.0 / spacing).round() as i32;

    for i in 0..nx {
        for j in 0..ny {
            for k in 0..nz {
                let offset = Vector3::new(
                    (i as f32 + 0.5) * spacing - half_extents.x,
                    (j as f32 + 0.5) * spacing - half_extents.y,
                    (k as f32 + 0.5) * spacing - half_extents.z,
                );
                let p = center + offset;
                particles.push(Particle::new(nalgebra::point![p.x, p.y, p.z]));
            }
        }
    }

    particles
}
