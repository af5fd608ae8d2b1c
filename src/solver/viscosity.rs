use crate::grid::neighbors::GpuNeighborList;
use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// XSPH viscosity + surface tension.
///
/// Three dispatches: surface normals, staged velocity/tension accumulation,
/// then the XSPH blend — staged so no dispatch reads a velocity another
/// thread is writing.
#[derive(Shader)]
#[shader(module = "ripple::solver::viscosity")]
pub struct WgViscosity<B: Backend> {
    pub compute_normals: GpuFunction<B>,
    pub compute_viscosity: GpuFunction<B>,
    pub apply_viscosity: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct ViscosityArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    positions: &'a GpuVector<ParticlePosition, B>,
    velocities: &'a GpuVector<ParticlePosition, B>,
    normals: &'a GpuVector<ParticlePosition, B>,
    deltas: &'a GpuVector<ParticlePosition, B>,
    accelerations: &'a GpuVector<ParticlePosition, B>,
    neighbor_offsets: &'a GpuVector<u32, B>,
    neighbors: &'a GpuVector<u32, B>,
}

impl<B: Backend> WgViscosity<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        neighborhood: &GpuNeighborList<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = ViscosityArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            positions: particles.positions(),
            velocities: particles.velocities(),
            normals: particles.normals(),
            deltas: particles.deltas(),
            accelerations: particles.accelerations(),
            neighbor_offsets: &neighborhood.offsets,
            neighbors: &neighborhood.neighbors,
        };
        let n = [particles.len() as u32, 1, 1];
        self.compute_normals.launch(backend, pass, &args, n)?;
        self.compute_viscosity.launch(backend, pass, &args, n)?;
        self.apply_viscosity.launch(backend, pass, &args, n)
    }
}
