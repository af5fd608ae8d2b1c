#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_inception)]

//! GPU position-based fluids.
//!
//! The crate is organized around three layers:
//! - [`grid`]: a parallel exclusive scan and the spatial-hash neighbor
//!   search built on top of it (uniform grid, counting sort, flat
//!   per-particle neighbor lists).
//! - [`solver`]: the PBF constraint solver passes (integration, density
//!   constraint projection, velocity reconstruction, vorticity confinement,
//!   XSPH viscosity and surface tension) plus the boundary discrete-field
//!   sampler.
//! - [`pipeline`]: owned kernel objects and GPU buffers bundled into a
//!   per-step dispatch sequence appended to a caller-provided encoder.

use slang_hal::re_exports::include_dir;
use slang_hal::re_exports::minislang::SlangCompiler;

pub mod grid;
pub mod pipeline;
pub mod solver;

pub const SLANG_SRC_DIR: include_dir::Dir<'_> =
    include_dir::include_dir!("$CARGO_MANIFEST_DIR/shaders");
pub fn register_shaders(compiler: &mut SlangCompiler) {
    compiler.add_dir(SLANG_SRC_DIR.clone());
}

/// Errors raised by host-side configuration and construction paths.
///
/// GPU launch paths propagate the backend error type directly; everything
/// that can be validated before a dispatch is validated here, synchronously.
#[derive(thiserror::Error, Debug)]
pub enum SimError<E> {
    /// Error reported by the GPU backend (device loss, allocation failure, …).
    #[error(transparent)]
    Backend(#[from] E),
    /// The logical particle count would exceed the fixed buffer capacity.
    #[error("particle count {count} exceeds the solver capacity {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },
    /// Seed arrays must agree on the particle count.
    #[error("position array length {positions} does not match velocity array length {velocities}")]
    PositionCountMismatch { positions: usize, velocities: usize },
    /// The requested interaction radius produces more grid cells than the
    /// scan engine supports.
    #[error("search radius {radius} is below the minimum supported radius {min}")]
    SearchRadiusTooSmall { radius: f32, min: f32 },
    /// Scan inputs must be a multiple of the block length and fit in two
    /// scan levels.
    #[error("scan length {len} is not supported (must be a non-zero multiple of {block} and at most {max})")]
    ScanLengthNotSupported { len: u32, block: u32, max: u32 },
    /// The boundary field payload is malformed.
    #[error("boundary field format error: {0}")]
    BoundaryFieldFormat(String),
}
