//! PBF constraint solver passes and the boundary discrete-field sampler.
//!
//! One simulation step executes these stages, each implemented as an owned
//! kernel object dispatched by the pipeline:
//!
//! 1. **Integrate** ([`WgIntegrate`]): semi-implicit Euler prediction with a
//!    jittered clamp to the unit domain.
//! 2. **Neighbor rebuild**: see [`crate::grid`].
//! 3. **Constraint iterations** (fixed count): boundary contact refresh
//!    ([`WgBoundarySample`]), density/lambda ([`WgLambda`]), position
//!    correction ([`WgPositionDelta`]).
//! 4. **Velocity reconstruction + commit** ([`WgVelocityUpdate`]).
//! 5. **Vorticity confinement** ([`WgVorticity`]).
//! 6. **XSPH viscosity + surface tension** ([`WgViscosity`]).
//!
//! # Key types
//!
//! - [`Particle`]: CPU-side seed state (position, velocity).
//! - [`GpuParticles`]: fixed-capacity SoA GPU buffers for all particle state.
//! - [`BoundaryField`] / [`GpuBoundaryField`]: the precomputed SDF + volume
//!   field and its GPU upload.
//! - [`SolverConfig`] / [`SimulationParams`]: host configuration and its GPU
//!   uniform mirror.

pub use boundary::{
    BoundaryField, BoundaryFieldMetadata, GpuBoundaryField, WgBoundarySample,
};
pub use delta::WgPositionDelta;
pub use integrate::WgIntegrate;
pub use lambda::WgLambda;
pub use params::{GpuSimulationParams, SimulationParams, SolverConfig};
pub use particle::{GpuParticles, Particle, ParticlePosition};
pub use update::WgVelocityUpdate;
pub use viscosity::WgViscosity;
pub use vorticity::WgVorticity;

mod boundary;
mod delta;
mod integrate;
mod lambda;
mod params;
mod particle;
mod update;
mod viscosity;
mod vorticity;
