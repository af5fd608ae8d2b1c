use bytemuck::{Pod, Zeroable};
use nalgebra::Vector3;
use slang_hal::backend::Backend;
use stensor::tensor::{GpuScalar, GpuTensor};
use slang_hal::BufferUsages;

/// Host-side solver configuration.
///
/// Every knob can be changed at any time; values take effect on the next
/// step. The interaction (search) radius is deliberately not part of this
/// struct: it is fixed at construction because the grid and neighbor-list
/// allocations depend on it.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SolverConfig {
    pub gravity: Vector3<f32>,
    pub dt: f32,
    pub particle_radius: f32,
    /// XSPH velocity-smoothing coefficient.
    pub xsph_coeff: f32,
    /// Vorticity-confinement strength.
    pub vorticity_coeff: f32,
    /// Surface-tension (cohesion + curvature) strength.
    pub cohesion_coeff: f32,
    /// Density-constraint projection count per step.
    pub constraint_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            dt: 1.0 / 300.0,
            particle_radius: 0.01,
            xsph_coeff: 0.05,
            vorticity_coeff: 0.01,
            cohesion_coeff: 0.0,
            constraint_iterations: 5,
        }
    }
}

impl SolverConfig {
    /// Builds the GPU uniform for the given step.
    pub fn to_params(&self, search_radius: f32, step_index: u32) -> SimulationParams {
        let d = self.particle_radius * 2.0;
        SimulationParams {
            gravity: self.gravity,
            dt: self.dt,
            particle_radius: self.particle_radius,
            search_radius,
            particle_volume: d * d * d,
            xsph_coeff: self.xsph_coeff,
            vorticity_coeff: self.vorticity_coeff,
            cohesion_coeff: self.cohesion_coeff,
            step_index,
            padding: 0.0,
        }
    }
}

/// GPU mirror of [`SolverConfig`] plus per-step state, shared by every
/// solver kernel as a uniform.
#[derive(Copy, Clone, PartialEq, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct SimulationParams {
    pub gravity: Vector3<f32>,
    pub dt: f32,
    pub particle_radius: f32,
    pub search_radius: f32,
    /// Per-particle volume `(2·particle_radius)³` (cube packing, so a
    /// uniform lattice at rest spacing has density 1).
    pub particle_volume: f32,
    pub xsph_coeff: f32,
    pub vorticity_coeff: f32,
    pub cohesion_coeff: f32,
    /// Step counter seeding the jittered domain clamp.
    pub step_index: u32,
    pub padding: f32,
}

pub struct GpuSimulationParams<B: Backend> {
    pub params: GpuScalar<SimulationParams, B>,
}

impl<B: Backend> GpuSimulationParams<B> {
    pub fn new(backend: &B, params: SimulationParams) -> Result<Self, B::Error> {
        Ok(Self {
            params: GpuTensor::scalar(
                backend,
                params,
                BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            )?,
        })
    }

    /// Re-uploads the uniform; effective for every dispatch submitted after
    /// the write.
    pub fn write(&mut self, backend: &B, params: SimulationParams) -> Result<(), B::Error> {
        backend.write_buffer(self.params.buffer_mut(), 0, &[params])
    }
}
