//! Two-pass neighbor enumeration over the 3×3×3 cell neighborhood.

use crate::grid::grid::{GpuGrid, GpuGridMetadata};
use crate::grid::prefix_sum::{PrefixSumWorkspace, WgPrefixSum};
use crate::solver::{GpuParticles, ParticlePosition};
use crate::SimError;
use nalgebra::DVector;
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{BufferUsages, Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// GPU kernels building the flat neighbor list.
///
/// A first pass counts neighbors per particle, the counts are scanned into
/// offsets, then a second pass writes the neighbor indices at the now-known
/// offsets. The enumeration keeps any index whose squared distance is within
/// the interaction radius — including the querying particle itself, which the
/// solver kernels rely on (the Spiky gradient vanishes at r = 0, and the
/// Poly6 self-term is part of the rest-density calibration).
#[derive(Shader)]
#[shader(module = "ripple::grid::neighbors")]
pub struct WgNeighbors<B: Backend> {
    count_neighbors: GpuFunction<B>,
    fill_neighbors: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct NeighborArgs<'a, B: Backend> {
    grid: &'a GpuScalar<GpuGridMetadata, B>,
    cell_counts: &'a GpuVector<u32, B>,
    cell_offsets: &'a GpuVector<u32, B>,
    sorted_ids: &'a GpuVector<u32, B>,
    neighbor_counts: &'a GpuVector<u32, B>,
    neighbor_offsets: &'a GpuVector<u32, B>,
    neighbors: &'a GpuVector<u32, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    particles_len: &'a GpuScalar<u32, B>,
}

impl<B: Backend> WgNeighbors<B> {
    /// Rebuilds the neighbor list for the current predicted positions.
    ///
    /// Must run after [`crate::grid::grid::WgGrid::launch_sort`] on the same
    /// pass (ordering is guaranteed by submission order only).
    pub fn launch_detect(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        grid: &GpuGrid<B>,
        neighborhood: &GpuNeighborList<B>,
        particles: &GpuParticles<B>,
        prefix_sum: &PrefixSumWorkspace<B>,
        prefix_sum_module: &WgPrefixSum<B>,
    ) -> Result<(), B::Error> {
        let args = NeighborArgs {
            grid: &grid.meta,
            cell_counts: &grid.cell_counts,
            cell_offsets: &grid.cell_offsets,
            sorted_ids: &grid.sorted_ids,
            neighbor_counts: &neighborhood.counts,
            neighbor_offsets: &neighborhood.offsets,
            neighbors: &neighborhood.neighbors,
            predicted: particles.predicted(),
            particles_len: particles.gpu_len(),
        };

        let n = particles.len() as u32;
        self.count_neighbors.launch(backend, pass, &args, [n, 1, 1])?;
        prefix_sum_module.launch(
            backend,
            pass,
            prefix_sum,
            &neighborhood.counts,
            &neighborhood.offsets,
        )?;
        self.fill_neighbors.launch(backend, pass, &args, [n, 1, 1])?;

        Ok(())
    }
}

/// Flat variable-length neighbor list.
///
/// `offsets[i + 1] - offsets[i]` is the exact neighbor count of particle `i`;
/// the entries between those offsets are its neighbor indices, order
/// unspecified. The flat list capacity is a caller obligation: undersizing it
/// for a pathologically clustered configuration is not detected in the hot
/// path.
pub struct GpuNeighborList<B: Backend> {
    pub counts: GpuVector<u32, B>,
    pub offsets: GpuVector<u32, B>,
    pub neighbors: GpuVector<u32, B>,
}

impl<B: Backend> GpuNeighborList<B> {
    pub fn with_capacity(
        backend: &B,
        particle_capacity: u32,
        neighbor_capacity: u32,
    ) -> Result<Self, SimError<B::Error>> {
        // One extra slot so offsets[particle_count] (the total) always exists,
        // then padded up to scan conformance. The padding tail stays zero:
        // the count pass only ever writes indices below the particle count.
        let padded = WgPrefixSum::<B>::padded_len(particle_capacity + 1);
        WgPrefixSum::<B>::supported_len(padded)?;

        let zeros = DVector::<u32>::zeros(padded as usize);
        Ok(Self {
            counts: GpuVector::vector(backend, &zeros, BufferUsages::STORAGE)?,
            offsets: GpuVector::vector(
                backend,
                &zeros,
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            )?,
            neighbors: GpuVector::vector(
                backend,
                &DVector::<u32>::zeros(neighbor_capacity as usize),
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            )?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{GpuNeighborList, WgNeighbors};
    use crate::grid::grid::{GpuGrid, WgGrid};
    use crate::grid::prefix_sum::{PrefixSumWorkspace, WgPrefixSum};
    use crate::grid::sort::WgSort;
    use crate::solver::{GpuParticles, Particle};
    use nalgebra::{point, Point3};
    use slang_hal::backend::{Backend, Encoder, WebGpu};
    use slang_hal::re_exports::minislang::SlangCompiler;
    use slang_hal::{BufferUsages, Shader};
    use stensor::tensor::GpuVector;

    async fn test_gpu() -> Option<(WebGpu, SlangCompiler)> {
        let gpu = WebGpu::new(Default::default(), wgpu::Limits::default())
            .await
            .ok()?;
        let mut compiler = SlangCompiler::default();
        crate::register_shaders(&mut compiler);
        Some((gpu, compiler))
    }

    fn jittered_cloud() -> Vec<Point3<f32>> {
        // Deterministic pseudo-random positions in [0.2, 0.8]³.
        let mut state = 0x12345678u32;
        let mut rand01 = move || {
            state = state.wrapping_mul(747796405).wrapping_add(2891336453);
            (state >> 8) as f32 / (1u32 << 24) as f32
        };
        (0..500)
            .map(|_| point![
                0.2 + 0.6 * rand01(),
                0.2 + 0.6 * rand01(),
                0.2 + 0.6 * rand01()
            ])
            .collect()
    }

    async fn read_u32s(gpu: &WebGpu, src: &GpuVector<u32, WebGpu>) -> Vec<u32> {
        let mut staging: GpuVector<u32, WebGpu> = GpuVector::vector_uninit(
            gpu,
            src.len() as u32,
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        )
        .unwrap();
        let mut encoder = gpu.begin_encoding();
        staging.copy_from_view(&mut encoder, src).unwrap();
        gpu.submit(encoder).unwrap();
        gpu.synchronize().unwrap();
        let mut out = vec![0u32; src.len() as usize];
        gpu.read_buffer(staging.buffer(), &mut out).await.unwrap();
        out
    }

    #[futures_test::test]
    #[serial_test::serial]
    async fn gpu_counting_sort_and_neighbor_list() {
        let Some((gpu, compiler)) = test_gpu().await else {
            return;
        };
        let grid_module = WgGrid::from_backend(&gpu, &compiler).unwrap();
        let sort_module = WgSort::from_backend(&gpu, &compiler).unwrap();
        let neighbors_module = WgNeighbors::from_backend(&gpu, &compiler).unwrap();
        let prefix_sum_module = WgPrefixSum::from_backend(&gpu, &compiler).unwrap();

        let radius = 0.1f32;
        let positions = jittered_cloud();
        let n = positions.len();

        let particles: Vec<_> = positions.iter().map(|p| Particle::new(*p)).collect();
        // The neighbor search runs against predicted positions, which
        // set_particles seeds alongside the committed ones.
        let mut gpu_particles = GpuParticles::with_capacity(&gpu, 1024).unwrap();
        gpu_particles.set_particles(&gpu, &particles).unwrap();

        let grid = GpuGrid::with_capacity(&gpu, radius, 1024).unwrap();
        let neighborhood = GpuNeighborList::with_capacity(&gpu, 1024, 1024 * 64).unwrap();
        let prefix_sum = PrefixSumWorkspace::new(&gpu).unwrap();

        let mut encoder = gpu.begin_encoding();
        {
            let mut pass = encoder.begin_pass();
            grid_module
                .launch_sort(
                    &gpu,
                    &mut pass,
                    &grid,
                    &gpu_particles,
                    &prefix_sum,
                    &sort_module,
                    &prefix_sum_module,
                )
                .unwrap();
            neighbors_module
                .launch_detect(
                    &gpu,
                    &mut pass,
                    &grid,
                    &neighborhood,
                    &gpu_particles,
                    &prefix_sum,
                    &prefix_sum_module,
                )
                .unwrap();
        }
        gpu.submit(encoder).unwrap();
        gpu.synchronize().unwrap();

        let sorted_ids = read_u32s(&gpu, &grid.sorted_ids).await;
        let cell_offsets = read_u32s(&gpu, &grid.cell_offsets).await;
        let offsets = read_u32s(&gpu, &neighborhood.offsets).await;
        let list = read_u32s(&gpu, &neighborhood.neighbors).await;

        // Counting-sort bucket property: every particle's slot lies within
        // its own cell's range and the slots form a permutation of [0, n).
        let dim = grid.meta_cpu.dim as usize;
        let cell_of = |p: &Point3<f32>| {
            let c = |x: f32| ((x * dim as f32) as usize).min(dim - 1);
            (c(p.z) * dim + c(p.y)) * dim + c(p.x)
        };
        let mut seen = vec![false; n];
        for (slot, &pid) in sorted_ids[..n].iter().enumerate() {
            let pid = pid as usize;
            assert!(pid < n, "sorted slot {slot} holds an out-of-range id");
            assert!(!seen[pid], "particle {pid} appears in two sorted slots");
            seen[pid] = true;

            let cell = cell_of(&positions[pid]);
            let start = cell_offsets[cell] as usize;
            let end = if cell + 1 < cell_offsets.len() {
                cell_offsets[cell + 1] as usize
            } else {
                n
            };
            assert!(
                (start..end).contains(&slot),
                "slot {slot} of particle {pid} is outside its cell range {start}..{end}"
            );
        }
        assert!(seen.iter().all(|&s| s));

        // Neighbor symmetry + documented self-inclusion, against a brute
        // force reference.
        let neighbor_sets: Vec<std::collections::BTreeSet<u32>> = (0..n)
            .map(|i| {
                list[offsets[i] as usize..offsets[i + 1] as usize]
                    .iter()
                    .copied()
                    .collect()
            })
            .collect();
        for i in 0..n {
            assert!(
                neighbor_sets[i].contains(&(i as u32)),
                "particle {i} is missing from its own neighbor list"
            );
            for j in 0..n {
                let within = (positions[i] - positions[j]).norm_squared() <= radius * radius;
                assert_eq!(
                    neighbor_sets[i].contains(&(j as u32)),
                    within,
                    "neighbor list mismatch for pair ({i}, {j})"
                );
                if within {
                    assert!(neighbor_sets[j].contains(&(i as u32)));
                }
            }
        }
    }
}
