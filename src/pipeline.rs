use crate::grid::grid::{GpuGrid, WgGrid};
use crate::grid::neighbors::{GpuNeighborList, WgNeighbors};
use crate::grid::prefix_sum::{PrefixSumWorkspace, WgPrefixSum};
use crate::grid::sort::WgSort;
use crate::solver::{
    BoundaryField, GpuBoundaryField, GpuParticles, GpuSimulationParams, Particle,
    ParticlePosition, SolverConfig, WgBoundarySample, WgIntegrate, WgLambda, WgPositionDelta,
    WgVelocityUpdate, WgViscosity, WgVorticity,
};
use crate::SimError;
use nalgebra::Point3;
use slang_hal::backend::{Backend, Encoder};
use slang_hal::re_exports::minislang::SlangCompiler;
use slang_hal::Shader;
use stensor::tensor::GpuVector;

/// Owned kernel objects for one PBF solver.
///
/// Pipelines are constructed explicitly per instance; nothing is cached in
/// globals, so independent solvers with different capacities can coexist.
pub struct PbfPipeline<B: Backend> {
    grid: WgGrid<B>,
    prefix_sum: WgPrefixSum<B>,
    sort: WgSort<B>,
    neighbors: WgNeighbors<B>,
    boundary_sample: WgBoundarySample<B>,
    integrate: WgIntegrate<B>,
    lambda: WgLambda<B>,
    position_delta: WgPositionDelta<B>,
    velocity_update: WgVelocityUpdate<B>,
    vorticity: WgVorticity<B>,
    viscosity: WgViscosity<B>,
}

/// All GPU buffers of one solver instance.
pub struct PbfData<B: Backend> {
    pub config: SolverConfig,
    pub sim_params: GpuSimulationParams<B>,
    pub particles: GpuParticles<B>,
    pub grid: GpuGrid<B>,
    pub neighborhood: GpuNeighborList<B>,
    pub boundary: GpuBoundaryField<B>,
    prefix_sum: PrefixSumWorkspace<B>,
    search_radius: f32,
    step_index: u32,
}

impl<B: Backend> PbfData<B> {
    /// Allocates a solver instance with a default flat neighbor-list
    /// capacity of 64 entries per particle.
    pub fn new(
        backend: &B,
        config: SolverConfig,
        search_radius: f32,
        particle_capacity: u32,
    ) -> Result<Self, SimError<B::Error>> {
        Self::with_neighbor_capacity(
            backend,
            config,
            search_radius,
            particle_capacity,
            particle_capacity.saturating_mul(64),
        )
    }

    /// Allocates a solver instance with an explicit flat neighbor-list
    /// capacity.
    ///
    /// Sizing that capacity for worst-case clustering is the caller's
    /// obligation; overflowing it at runtime is not detected in the hot
    /// path.
    pub fn with_neighbor_capacity(
        backend: &B,
        config: SolverConfig,
        search_radius: f32,
        particle_capacity: u32,
        neighbor_capacity: u32,
    ) -> Result<Self, SimError<B::Error>> {
        let grid = GpuGrid::with_capacity(backend, search_radius, particle_capacity)?;
        let neighborhood =
            GpuNeighborList::with_capacity(backend, particle_capacity, neighbor_capacity)?;
        let particles = GpuParticles::with_capacity(backend, particle_capacity)?;
        let sim_params = GpuSimulationParams::new(backend, config.to_params(search_radius, 0))?;
        let boundary = GpuBoundaryField::empty(backend)?;
        let prefix_sum = PrefixSumWorkspace::new(backend)?;

        Ok(Self {
            config,
            sim_params,
            particles,
            grid,
            neighborhood,
            boundary,
            prefix_sum,
            search_radius,
            step_index: 0,
        })
    }

    /// The interaction radius this instance was built for.
    pub fn search_radius(&self) -> f32 {
        self.search_radius
    }

    /// Renderer-facing position buffer (density packed in `w`).
    pub fn positions(&self) -> &GpuVector<ParticlePosition, B> {
        self.particles.positions()
    }

    /// Replaces the particle population.
    pub fn set_particles(
        &mut self,
        backend: &B,
        particles: &[Particle],
    ) -> Result<(), SimError<B::Error>> {
        self.particles.set_particles(backend, particles)
    }

    /// Appends voxelization output to the position buffer.
    pub fn append_particles(
        &mut self,
        backend: &B,
        positions: &[Point3<f32>],
    ) -> Result<(), SimError<B::Error>> {
        self.particles.append_particles(backend, positions)
    }

    /// Parses and uploads a boundary field payload.
    pub fn set_boundary_data(&mut self, backend: &B, text: &str) -> Result<(), SimError<B::Error>> {
        let field = BoundaryField::parse(text)?;
        self.boundary = GpuBoundaryField::upload(backend, &field)?;
        Ok(())
    }

    /// Clears all dynamic state: particles, boundary field, step counter.
    pub fn reset(&mut self, backend: &B) -> Result<(), B::Error> {
        self.particles.reset(backend)?;
        self.boundary.clear(backend)?;
        self.step_index = 0;
        Ok(())
    }
}

impl<B: Backend> PbfPipeline<B> {
    pub fn new(backend: &B, compiler: &SlangCompiler) -> Result<Self, B::Error> {
        Ok(Self {
            grid: WgGrid::from_backend(backend, compiler)?,
            prefix_sum: WgPrefixSum::from_backend(backend, compiler)?,
            sort: WgSort::from_backend(backend, compiler)?,
            neighbors: WgNeighbors::from_backend(backend, compiler)?,
            boundary_sample: WgBoundarySample::from_backend(backend, compiler)?,
            integrate: WgIntegrate::from_backend(backend, compiler)?,
            lambda: WgLambda::from_backend(backend, compiler)?,
            position_delta: WgPositionDelta::from_backend(backend, compiler)?,
            velocity_update: WgVelocityUpdate::from_backend(backend, compiler)?,
            vorticity: WgVorticity::from_backend(backend, compiler)?,
            viscosity: WgViscosity::from_backend(backend, compiler)?,
        })
    }

    /// Appends one simulation step to `encoder`.
    ///
    /// The step is a DAG of dispatches ordered purely by submission order;
    /// the caller decides when to submit. Nothing is dispatched while the
    /// particle set is empty.
    pub fn launch_step(
        &self,
        backend: &B,
        encoder: &mut B::Encoder,
        data: &mut PbfData<B>,
    ) -> Result<(), B::Error> {
        if data.particles.is_empty() {
            return Ok(());
        }

        data.step_index = data.step_index.wrapping_add(1);
        data.sim_params.write(
            backend,
            data.config.to_params(data.search_radius, data.step_index),
        )?;

        {
            let mut pass = encoder.begin_pass();
            self.integrate
                .launch(backend, &mut pass, &data.sim_params, &data.particles)?;
        }

        {
            let mut pass = encoder.begin_pass();
            self.grid.launch_sort(
                backend,
                &mut pass,
                &data.grid,
                &data.particles,
                &data.prefix_sum,
                &self.sort,
                &self.prefix_sum,
            )?;
            self.neighbors.launch_detect(
                backend,
                &mut pass,
                &data.grid,
                &data.neighborhood,
                &data.particles,
                &data.prefix_sum,
                &self.prefix_sum,
            )?;
        }

        for _ in 0..data.config.constraint_iterations {
            let mut pass = encoder.begin_pass();
            // Boundary contact can change as the position is corrected, so
            // it is refreshed every iteration.
            self.boundary_sample.launch(
                backend,
                &mut pass,
                &data.sim_params,
                &data.boundary,
                &data.particles,
            )?;
            self.lambda.launch(
                backend,
                &mut pass,
                &data.sim_params,
                &data.neighborhood,
                &data.particles,
            )?;
            self.position_delta.launch(
                backend,
                &mut pass,
                &data.sim_params,
                &data.neighborhood,
                &data.particles,
            )?;
        }

        {
            let mut pass = encoder.begin_pass();
            self.velocity_update
                .launch(backend, &mut pass, &data.sim_params, &data.particles)?;
        }

        {
            let mut pass = encoder.begin_pass();
            self.vorticity.launch(
                backend,
                &mut pass,
                &data.sim_params,
                &data.neighborhood,
                &data.particles,
            )?;
        }

        {
            let mut pass = encoder.begin_pass();
            self.viscosity.launch(
                backend,
                &mut pass,
                &data.sim_params,
                &data.neighborhood,
                &data.particles,
            )?;
        }

        Ok(())
    }
}

/// Lifecycle capabilities shared by simulator variants.
///
/// Variants are independent types selected at startup; there is no common
/// base state, only this contract.
pub trait Simulation<B: Backend> {
    /// Appends one step's dispatches to a caller-provided command stream.
    fn step(&mut self, backend: &B, encoder: &mut B::Encoder) -> Result<(), B::Error>;
    /// Clears all dynamic state back to empty.
    fn reset(&mut self, backend: &B) -> Result<(), B::Error>;
    /// Replaces the numeric configuration; takes effect on the next step.
    fn set_config(&mut self, config: SolverConfig);
}

/// The PBF variant: pipeline + data bundled behind [`Simulation`].
pub struct PbfSimulation<B: Backend> {
    pub pipeline: PbfPipeline<B>,
    pub data: PbfData<B>,
}

impl<B: Backend> PbfSimulation<B> {
    pub fn new(
        backend: &B,
        compiler: &SlangCompiler,
        config: SolverConfig,
        search_radius: f32,
        particle_capacity: u32,
    ) -> Result<Self, SimError<B::Error>> {
        Ok(Self {
            pipeline: PbfPipeline::new(backend, compiler)?,
            data: PbfData::new(backend, config, search_radius, particle_capacity)?,
        })
    }
}

impl<B: Backend> Simulation<B> for PbfSimulation<B> {
    fn step(&mut self, backend: &B, encoder: &mut B::Encoder) -> Result<(), B::Error> {
        self.pipeline.launch_step(backend, encoder, &mut self.data)
    }

    fn reset(&mut self, backend: &B) -> Result<(), B::Error> {
        self.data.reset(backend)
    }

    fn set_config(&mut self, config: SolverConfig) {
        self.data.config = config;
    }
}

#[cfg(test)]
mod test {
    use super::{PbfData, PbfPipeline};
    use crate::solver::{Particle, ParticlePosition, SolverConfig};
    use nalgebra::{point, vector, Vector3};
    use slang_hal::backend::{Backend, Encoder, WebGpu};
    use slang_hal::re_exports::minislang::SlangCompiler;
    use slang_hal::{BufferUsages, Shader};
    use stensor::tensor::GpuVector;

    async fn test_gpu() -> Option<(WebGpu, SlangCompiler)> {
        let limits = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 10,
            ..wgpu::Limits::default()
        };
        let gpu = WebGpu::new(Default::default(), limits).await.ok()?;
        let mut compiler = SlangCompiler::default();
        crate::register_shaders(&mut compiler);
        Some((gpu, compiler))
    }

    async fn read_positions(
        gpu: &WebGpu,
        data: &PbfData<WebGpu>,
    ) -> Vec<ParticlePosition> {
        let n = data.particles.len();
        let mut staging: GpuVector<ParticlePosition, WebGpu> = GpuVector::vector_uninit(
            gpu,
            n as u32,
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        )
        .unwrap();
        let mut encoder = gpu.begin_encoding();
        staging
            .copy_from_view(&mut encoder, data.particles.positions())
            .unwrap();
        gpu.submit(encoder).unwrap();
        gpu.synchronize().unwrap();
        let mut out = vec![ParticlePosition::zeros(); n];
        gpu.read_buffer(staging.buffer(), &mut out).await.unwrap();
        out
    }

    fn cube(center: Vector3<f32>, side: f32, per_axis: usize) -> Vec<Particle> {
        let spacing = side / per_axis as f32;
        let mut particles = vec![];
        for i in 0..per_axis {
            for j in 0..per_axis {
                for k in 0..per_axis {
                    let offset = vector![
                        (i as f32 + 0.5) * spacing - side / 2.0,
                        (j as f32 + 0.5) * spacing - side / 2.0,
                        (k as f32 + 0.5) * spacing - side / 2.0
                    ];
                    let p = center + offset;
                    particles.push(Particle::new(point![p.x, p.y, p.z]));
                }
            }
        }
        particles
    }

    #[futures_test::test]
    #[serial_test::serial]
    async fn density_converges_with_iteration_count() {
        let Some((gpu, compiler)) = test_gpu().await else {
            return;
        };
        let pipeline = PbfPipeline::new(&gpu, &compiler).unwrap();

        // A mildly compressed lattice: rest spacing would be 2r = 0.02, the
        // seeded spacing is 10% tighter, so the initial density sits above 1
        // and the projection must pull it back down.
        let search_radius = 0.04f32;
        let particle_radius = 0.01f32;
        let particles = cube(vector![0.5, 0.5, 0.5], 0.18, 10);

        let mut errors = vec![];
        for iterations in [1u32, 2, 3, 5] {
            let config = SolverConfig {
                gravity: Vector3::zeros(),
                dt: 1.0e-4,
                particle_radius,
                xsph_coeff: 0.0,
                vorticity_coeff: 0.0,
                cohesion_coeff: 0.0,
                constraint_iterations: iterations,
            };
            let mut data = PbfData::new(&gpu, config, search_radius, 2048).unwrap();
            data.set_particles(&gpu, &particles).unwrap();

            let mut encoder = gpu.begin_encoding();
            pipeline.launch_step(&gpu, &mut encoder, &mut data).unwrap();
            gpu.submit(encoder).unwrap();
            gpu.synchronize().unwrap();

            let positions = read_positions(&gpu, &data).await;
            let mean_density =
                positions.iter().map(|p| p.w).sum::<f32>() / positions.len() as f32;
            errors.push((mean_density - 1.0).abs());
        }

        for pair in errors.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1.0e-3,
                "density error increased across iteration counts: {errors:?}"
            );
        }
        assert!(
            errors.last().unwrap() < &errors[0],
            "density error did not improve from 1 to 5 iterations: {errors:?}"
        );
    }

    #[futures_test::test]
    #[serial_test::serial]
    async fn free_fall_reaches_the_floor_and_stays_in_domain() {
        let Some((gpu, compiler)) = test_gpu().await else {
            return;
        };
        let pipeline = PbfPipeline::new(&gpu, &compiler).unwrap();

        let config = SolverConfig {
            gravity: vector![0.0, -9.8, 0.0],
            dt: 1.0 / 300.0,
            particle_radius: 0.01,
            xsph_coeff: 0.0,
            vorticity_coeff: 0.0,
            cohesion_coeff: 0.0,
            constraint_iterations: 5,
        };
        let mut data = PbfData::new(&gpu, config, 0.04, 2048).unwrap();
        // 1,000 particles in a 0.2³ cube centered at y = 0.8; no boundary
        // field, so the floor is the ε-clamped domain itself.
        data.set_particles(&gpu, &cube(vector![0.5, 0.8, 0.5], 0.2, 10))
            .unwrap();

        let com_y = |positions: &[ParticlePosition]| {
            positions.iter().map(|p| p.y).sum::<f32>() / positions.len() as f32
        };

        // Free fall: the vertical center of mass must decrease strictly for
        // the first 20 steps.
        let mut prev_com = com_y(&read_positions(&gpu, &data).await);
        for step in 0..20 {
            let mut encoder = gpu.begin_encoding();
            pipeline.launch_step(&gpu, &mut encoder, &mut data).unwrap();
            gpu.submit(encoder).unwrap();
            gpu.synchronize().unwrap();

            let com = com_y(&read_positions(&gpu, &data).await);
            assert!(
                com < prev_com,
                "center of mass did not fall at step {step}: {com} >= {prev_com}"
            );
            prev_com = com;
        }

        for _ in 20..100 {
            let mut encoder = gpu.begin_encoding();
            pipeline.launch_step(&gpu, &mut encoder, &mut data).unwrap();
            gpu.submit(encoder).unwrap();
            gpu.synchronize().unwrap();
        }

        let positions = read_positions(&gpu, &data).await;
        for (i, p) in positions.iter().enumerate() {
            assert!(
                p.y > 0.0 && p.y < 1.0 && p.x > 0.0 && p.x < 1.0 && p.z > 0.0 && p.z < 1.0,
                "particle {i} escaped the domain: {p:?}"
            );
        }
    }
}
