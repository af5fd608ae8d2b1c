use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// Velocity reconstruction + position commit at the end of the constraint
/// iterations.
#[derive(Shader)]
#[shader(module = "ripple::solver::update")]
pub struct WgVelocityUpdate<B: Backend> {
    pub update_velocities: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct UpdateArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    positions: &'a GpuVector<ParticlePosition, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    velocities: &'a GpuVector<ParticlePosition, B>,
}

impl<B: Backend> WgVelocityUpdate<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = UpdateArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            positions: particles.positions(),
            predicted: particles.predicted(),
            velocities: particles.velocities(),
        };
        self.update_velocities
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }
}
