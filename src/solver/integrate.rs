use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

#[derive(Shader)]
#[shader(module = "ripple::solver::integrate")]
pub struct WgIntegrate<B: Backend> {
    pub integrate: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct IntegrateArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    particles_len: &'a GpuScalar<u32, B>,
    positions: &'a GpuVector<ParticlePosition, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    velocities: &'a GpuVector<ParticlePosition, B>,
    accelerations: &'a GpuVector<ParticlePosition, B>,
}

impl<B: Backend> WgIntegrate<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = IntegrateArgs {
            params: &sim_params.params,
            particles_len: particles.gpu_len(),
            positions: particles.positions(),
            predicted: particles.predicted(),
            velocities: particles.velocities(),
            accelerations: particles.accelerations(),
        };
        self.integrate
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }
}
