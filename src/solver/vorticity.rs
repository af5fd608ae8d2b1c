use crate::grid::neighbors::GpuNeighborList;
use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// Vorticity confinement: estimate per-particle angular velocity, then
/// write the confinement force into the acceleration buffer consumed by the
/// next step's integration.
#[derive(Shader)]
#[shader(module = "ripple::solver::vorticity")]
pub struct WgVorticity<B: Backend> {
    pub compute_angular_velocity: GpuFunction<B>,
    pub apply_confinement: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct VorticityArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    positions: &'a GpuVector<ParticlePosition, B>,
    velocities: &'a GpuVector<ParticlePosition, B>,
    angular_velocities: &'a GpuVector<ParticlePosition, B>,
    neighbor_offsets: &'a GpuVector<u32, B>,
    neighbors: &'a GpuVector<u32, B>,
    accelerations: &'a GpuVector<ParticlePosition, B>,
}

impl<B: Backend> WgVorticity<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        neighborhood: &GpuNeighborList<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = VorticityArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            positions: particles.positions(),
            velocities: particles.velocities(),
            angular_velocities: particles.angular_velocities(),
            neighbor_offsets: &neighborhood.offsets,
            neighbors: &neighborhood.neighbors,
            accelerations: particles.accelerations(),
        };
        let n = [particles.len() as u32, 1, 1];
        self.compute_angular_velocity.launch(backend, pass, &args, n)?;
        self.apply_confinement.launch(backend, pass, &args, n)
    }
}
