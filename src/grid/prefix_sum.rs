//! Parallel exclusive prefix sum (scan) on the GPU.

use crate::SimError;
use nalgebra::DVector;
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{BufferUsages, Shader, ShaderArgs};
use stensor::tensor::GpuVector;

/// GPU compute kernels for the work-efficient (Blelloch) exclusive scan.
///
/// The scan runs per 512-element block in groupshared memory (up-sweep,
/// barrier, down-sweep, with index padding against shared-memory bank
/// conflicts). Block totals are recovered by a separate copy dispatch, then
/// scanned by the same kernel, and a final gather adds each block's scanned
/// total back into its elements. One recursion level is enough because
/// supported lengths are capped at [`WgPrefixSum::MAX_LEN`].
#[derive(Shader)]
#[shader(module = "ripple::grid::prefix_sum")]
pub struct WgPrefixSum<B: Backend> {
    scan: GpuFunction<B>,
    copy_block_sums: GpuFunction<B>,
    add_block_sums: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct PrefixSumArgs<'a, B: Backend> {
    src: &'a GpuVector<u32, B>,
    dst: &'a GpuVector<u32, B>,
    sums: &'a GpuVector<u32, B>,
}

impl<B: Backend> WgPrefixSum<B> {
    // TODO: read the thread count from shader reflection instead of
    //       mirroring the constant here.
    pub const THREADS: u32 = 256;
    /// Elements scanned by one workgroup (two per thread).
    pub const BLOCK_LEN: u32 = Self::THREADS * 2;
    /// Maximum supported input length: one level of block sums must itself
    /// fit in a single block.
    pub const MAX_LEN: u32 = Self::BLOCK_LEN * Self::BLOCK_LEN;

    /// Checks that `len` conforms to the scan contract.
    ///
    /// Lengths must be non-zero multiples of [`Self::BLOCK_LEN`] and at most
    /// [`Self::MAX_LEN`]. Callers pad their buffers with zeros up to
    /// [`Self::padded_len`] rather than relying on ragged-tail handling in
    /// the kernel.
    pub fn supported_len<E>(len: u32) -> Result<(), SimError<E>> {
        if len == 0 || len % Self::BLOCK_LEN != 0 || len > Self::MAX_LEN {
            return Err(SimError::ScanLengthNotSupported {
                len,
                block: Self::BLOCK_LEN,
                max: Self::MAX_LEN,
            });
        }
        Ok(())
    }

    /// Smallest conforming length that can hold `len` elements.
    pub const fn padded_len(len: u32) -> u32 {
        len.div_ceil(Self::BLOCK_LEN) * Self::BLOCK_LEN
    }

    /// Computes `dst[i] = Σ_{j<i} src[j]` on the GPU.
    ///
    /// `src` and `dst` must have the same, conforming length (validated by
    /// the caller at construction time; violating it here is a programming
    /// error). `src` is left untouched so callers can keep using the raw
    /// counts next to the scanned offsets.
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        workspace: &PrefixSumWorkspace<B>,
        src: &GpuVector<u32, B>,
        dst: &GpuVector<u32, B>,
    ) -> Result<(), B::Error> {
        let len = src.len() as u32;
        assert_eq!(
            src.len(),
            dst.len(),
            "Internal error: scan source and destination must have the same length"
        );
        assert!(
            len % Self::BLOCK_LEN == 0 && len <= Self::MAX_LEN,
            "Internal error: scan length must be validated before dispatch"
        );

        let nblocks = len / Self::BLOCK_LEN;

        let args = PrefixSumArgs {
            src,
            dst,
            sums: &workspace.block_sums,
        };
        self.scan.launch_grid(backend, pass, &args, [nblocks, 1, 1])?;

        if nblocks > 1 {
            // The exclusive down-sweep consumed each block's total, so it is
            // recovered as dst[last] + src[last] in a separate dispatch.
            self.copy_block_sums
                .launch(backend, pass, &args, [nblocks, 1, 1])?;

            let sums_args = PrefixSumArgs {
                src: &workspace.block_sums,
                dst: &workspace.scanned_block_sums,
                sums: &workspace.total,
            };
            self.scan.launch_grid(backend, pass, &sums_args, [1, 1, 1])?;

            let gather_args = PrefixSumArgs {
                src,
                dst,
                sums: &workspace.scanned_block_sums,
            };
            self.add_block_sums
                .launch_grid(backend, pass, &gather_args, [nblocks, 1, 1])?;
        }

        Ok(())
    }

    /// CPU reference implementation used by tests.
    pub fn eval_cpu(&self, v: &DVector<u32>) -> DVector<u32> {
        let mut out = DVector::zeros(v.len());
        let mut acc = 0u32;
        for i in 0..v.len() {
            out[i] = acc;
            acc = acc.wrapping_add(v[i]);
        }
        out
    }
}

/// Auxiliary buffers for the two-level scan.
///
/// The block-sums stage is allocated at the fixed maximum block count, so a
/// single workspace serves every conforming input length and can be shared
/// between the cell scan and the neighbor-count scan of one solver instance.
pub struct PrefixSumWorkspace<B: Backend> {
    block_sums: GpuVector<u32, B>,
    scanned_block_sums: GpuVector<u32, B>,
    total: GpuVector<u32, B>,
}

impl<B: Backend> PrefixSumWorkspace<B> {
    pub fn new(backend: &B) -> Result<Self, B::Error> {
        let zeros = DVector::<u32>::zeros(WgPrefixSum::<B>::BLOCK_LEN as usize);
        Ok(Self {
            block_sums: GpuVector::vector(backend, &zeros, BufferUsages::STORAGE)?,
            scanned_block_sums: GpuVector::vector(backend, &zeros, BufferUsages::STORAGE)?,
            total: GpuVector::vector(
                backend,
                &DVector::<u32>::zeros(1),
                BufferUsages::STORAGE,
            )?,
        })
    }
}
