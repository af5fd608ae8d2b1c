use crate::grid::neighbors::GpuNeighborList;
use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// Density + Lagrange multiplier pass of the constraint projection.
#[derive(Shader)]
#[shader(module = "ripple::solver::lambda")]
pub struct WgLambda<B: Backend> {
    pub compute_lambdas: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct LambdaArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    boundary_contacts: &'a GpuVector<ParticlePosition, B>,
    neighbor_offsets: &'a GpuVector<u32, B>,
    neighbors: &'a GpuVector<u32, B>,
    lambdas: &'a GpuVector<f32, B>,
}

impl<B: Backend> WgLambda<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        neighborhood: &GpuNeighborList<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = LambdaArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            predicted: particles.predicted(),
            boundary_contacts: particles.boundary_contacts(),
            neighbor_offsets: &neighborhood.offsets,
            neighbors: &neighborhood.neighbors,
            lambdas: particles.lambdas(),
        };
        self.compute_lambdas
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }
}
