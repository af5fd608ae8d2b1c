use crate::grid::grid::{GpuGrid, GpuGridMetadata};
use crate::solver::{GpuParticles, ParticlePosition};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

#[derive(Shader)]
#[shader(module = "ripple::grid::sort")]
pub struct WgSort<B: Backend> {
    insert: GpuFunction<B>,
    sort: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct SortArgs<'a, B: Backend> {
    grid: &'a GpuScalar<GpuGridMetadata, B>,
    cell_counts: &'a GpuVector<u32, B>,
    cell_offsets: &'a GpuVector<u32, B>,
    ranks: &'a GpuVector<u32, B>,
    sorted_ids: &'a GpuVector<u32, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    particles_len: &'a GpuScalar<u32, B>,
}

impl<B: Backend> WgSort<B> {
    pub fn launch_insert(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        grid: &GpuGrid<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = self.args(grid, particles);
        self.insert
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }

    pub fn launch_sort(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        grid: &GpuGrid<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        let args = self.args(grid, particles);
        self.sort
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }

    fn args<'a>(
        &self,
        grid: &'a GpuGrid<B>,
        particles: &'a GpuParticles<B>,
    ) -> SortArgs<'a, B> {
        SortArgs {
            grid: &grid.meta,
            cell_counts: &grid.cell_counts,
            cell_offsets: &grid.cell_offsets,
            ranks: &grid.ranks,
            sorted_ids: &grid.sorted_ids,
            predicted: particles.predicted(),
            particles_len: particles.gpu_len(),
        }
    }
}
