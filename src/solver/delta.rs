use crate::grid::neighbors::GpuNeighborList;
use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// Position-correction pass: accumulate the constraint delta into its own
/// buffer, then apply it in a second dispatch so no thread reads a position
/// another thread is correcting.
#[derive(Shader)]
#[shader(module = "ripple::solver::delta")]
pub struct WgPositionDelta<B: Backend> {
    pub compute_deltas: GpuFunction<B>,
    pub apply_deltas: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct DeltaArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    boundary_contacts: &'a GpuVector<ParticlePosition, B>,
    neighbor_offsets: &'a GpuVector<u32, B>,
    neighbors: &'a GpuVector<u32, B>,
    lambdas: &'a GpuVector<f32, B>,
    deltas: &'a GpuVector<ParticlePosition, B>,
}

impl<B: Backend> WgPositionDelta<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        neighborhood: &GpuNeighborList<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = DeltaArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            predicted: particles.predicted(),
            boundary_contacts: particles.boundary_contacts(),
            neighbor_offsets: &neighborhood.offsets,
            neighbors: &neighborhood.neighbors,
            lambdas: particles.lambdas(),
            deltas: particles.deltas(),
        };
        let n = [particles.len() as u32, 1, 1];
        self.compute_deltas.launch(backend, pass, &args, n)?;
        self.apply_deltas.launch(backend, pass, &args, n)
    }
}
