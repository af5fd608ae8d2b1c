//! Uniform grid buffers and bucketing kernels for the neighbor search.

use crate::grid::prefix_sum::{PrefixSumWorkspace, WgPrefixSum};
use crate::grid::sort::WgSort;
use crate::solver::GpuParticles;
use crate::SimError;
use bytemuck::{Pod, Zeroable};
use nalgebra::DVector;
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{BufferUsages, Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// Grid metadata shared with every bucketing kernel.
#[derive(Copy, Clone, PartialEq, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct GpuGridMetadata {
    /// Cells per axis (`ceil(1 / search_radius)`).
    pub dim: u32,
    /// `dim³`.
    pub num_cells: u32,
    /// Cell-array length padded to the scan's block conformance.
    pub padded_cells: u32,
    /// Squared interaction radius, for the enumeration kernels.
    pub radius_sq: f32,
}

/// GPU kernels for grid reset and the insert → scan → counting-sort sequence.
#[derive(Shader)]
#[shader(module = "ripple::grid::grid")]
pub struct WgGrid<B: Backend> {
    reset: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct GridArgs<'a, B: Backend> {
    cell_counts: &'a GpuVector<u32, B>,
}

impl<B: Backend> WgGrid<B> {
    /// Buckets the current predicted positions into grid cells.
    ///
    /// Runs, in submission order on one pass: counter reset, atomic insert
    /// (each particle records its rank within its cell), an exclusive scan of
    /// the per-cell counts into per-cell base offsets, and the counting-sort
    /// write producing a cell-contiguous permutation of particle indices.
    pub fn launch_sort(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        grid: &GpuGrid<B>,
        particles: &GpuParticles<B>,
        prefix_sum: &PrefixSumWorkspace<B>,
        sort_module: &WgSort<B>,
        prefix_sum_module: &WgPrefixSum<B>,
    ) -> Result<(), B::Error> {
        let args = GridArgs {
            cell_counts: &grid.cell_counts,
        };
        self.reset
            .launch(backend, pass, &args, [grid.meta_cpu.padded_cells, 1, 1])?;

        sort_module.launch_insert(backend, pass, grid, particles)?;
        prefix_sum_module.launch(
            backend,
            pass,
            prefix_sum,
            &grid.cell_counts,
            &grid.cell_offsets,
        )?;
        sort_module.launch_sort(backend, pass, grid, particles)?;

        Ok(())
    }
}

/// GPU-resident uniform grid over the unit cube.
///
/// The grid is rebuilt from scratch every step; nothing persists between
/// steps except buffer allocations. Invariant after `launch_sort`:
/// `cell_offsets[c] + rank` is a unique slot in `[0, particle_count)` for
/// every particle of cell `c`, and the per-cell counts sum to the particle
/// count.
pub struct GpuGrid<B: Backend> {
    pub meta_cpu: GpuGridMetadata,
    pub meta: GpuScalar<GpuGridMetadata, B>,
    /// Per-cell atomic counters, zeroed every step.
    pub cell_counts: GpuVector<u32, B>,
    /// Exclusive prefix sum of `cell_counts`.
    pub cell_offsets: GpuVector<u32, B>,
    /// Per-particle insertion rank within its cell.
    pub ranks: GpuVector<u32, B>,
    /// Counting-sort permutation: original particle index per sorted slot.
    pub sorted_ids: GpuVector<u32, B>,
}

impl<B: Backend> GpuGrid<B> {
    /// Smallest interaction radius whose padded cell count still fits the
    /// scan engine (64³ cells is exactly the scan's maximum length).
    pub const MIN_SEARCH_RADIUS: f32 = 1.0 / 64.0;

    /// Allocates grid buffers for the given interaction radius and particle
    /// capacity.
    ///
    /// A radius below [`Self::MIN_SEARCH_RADIUS`] is a configuration error:
    /// the resulting cell count could not be scanned.
    pub fn with_capacity(
        backend: &B,
        search_radius: f32,
        particle_capacity: u32,
    ) -> Result<Self, SimError<B::Error>> {
        if !(search_radius >= Self::MIN_SEARCH_RADIUS) {
            return Err(SimError::SearchRadiusTooSmall {
                radius: search_radius,
                min: Self::MIN_SEARCH_RADIUS,
            });
        }

        let dim = ((1.0 / search_radius).ceil() as u32).max(1);
        let num_cells = dim * dim * dim;
        let padded_cells = WgPrefixSum::<B>::padded_len(num_cells);
        WgPrefixSum::<B>::supported_len(padded_cells)?;

        let meta_cpu = GpuGridMetadata {
            dim,
            num_cells,
            padded_cells,
            radius_sq: search_radius * search_radius,
        };
        let cell_zeros = DVector::<u32>::zeros(padded_cells as usize);
        let particle_zeros = DVector::<u32>::zeros(particle_capacity as usize);

        Ok(Self {
            meta_cpu,
            meta: GpuScalar::scalar(backend, meta_cpu, BufferUsages::STORAGE)?,
            cell_counts: GpuVector::vector(backend, &cell_zeros, BufferUsages::STORAGE)?,
            cell_offsets: GpuVector::vector(
                backend,
                &cell_zeros,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            )?,
            ranks: GpuVector::vector(backend, &particle_zeros, BufferUsages::STORAGE)?,
            sorted_ids: GpuVector::vector(
                backend,
                &particle_zeros,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            )?,
        })
    }
}
