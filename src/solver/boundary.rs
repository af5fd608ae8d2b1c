//! Boundary discrete field: a precomputed signed-distance + volume-fraction
//! field over a coarse grid, sampled with smooth quadratic nodal basis
//! functions to produce per-particle virtual boundary contacts.

use crate::solver::params::{GpuSimulationParams, SimulationParams};
use crate::solver::{GpuParticles, ParticlePosition};
use crate::SimError;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use slang_hal::backend::Backend;
use slang_hal::function::GpuFunction;
use slang_hal::{BufferUsages, Shader, ShaderArgs};
use stensor::tensor::{GpuScalar, GpuVector};

/// CPU-side boundary field, parsed from the text payload.
///
/// The field stores SDF and volume-fraction samples at the corners of an
/// `Rx × Ry × Rz` grid and at two points per edge along each axis, so that
/// the corner lattice together with one axis's edge samples forms a lattice
/// refined 3× along that axis.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryField {
    pub resolution: [u32; 3],
    pub sdf: Vec<f32>,
    pub volume: Vec<f32>,
}

impl BoundaryField {
    /// Number of samples per block (SDF or volume) for a given resolution.
    pub fn expected_len(resolution: [u32; 3]) -> usize {
        let [rx, ry, rz] = resolution.map(|r| r as usize);
        (rx + 1) * (ry + 1) * (rz + 1)
            + 2 * rx * (ry + 1) * (rz + 1)
            + (rx + 1) * 2 * ry * (rz + 1)
            + (rx + 1) * (ry + 1) * 2 * rz
    }

    /// Parses the flat text payload: `Rx Ry Rz` header followed by the SDF
    /// block and the volume block, whitespace separated.
    ///
    /// Any length mismatch against the expected sample count is a fatal
    /// format error.
    pub fn parse<E>(text: &str) -> Result<Self, SimError<E>> {
        let mut tokens = text.split_whitespace();

        let mut resolution = [0u32; 3];
        for (axis, r) in resolution.iter_mut().enumerate() {
            let tok = tokens.next().ok_or_else(|| {
                SimError::BoundaryFieldFormat("missing resolution header".to_string())
            })?;
            *r = tok.parse().map_err(|_| {
                SimError::BoundaryFieldFormat(format!(
                    "resolution component {axis} is not an integer: {tok:?}"
                ))
            })?;
        }
        if resolution.iter().any(|&r| r == 0) {
            return Err(SimError::BoundaryFieldFormat(format!(
                "resolution must be positive on every axis, got {resolution:?}"
            )));
        }

        let expected = Self::expected_len(resolution);
        let mut samples = Vec::with_capacity(2 * expected);
        for tok in tokens {
            let value: f32 = tok.parse().map_err(|_| {
                SimError::BoundaryFieldFormat(format!("sample is not a number: {tok:?}"))
            })?;
            samples.push(value);
        }
        if samples.len() != 2 * expected {
            return Err(SimError::BoundaryFieldFormat(format!(
                "expected {} samples ({expected} SDF + {expected} volume), found {}",
                2 * expected,
                samples.len()
            )));
        }

        let volume = samples.split_off(expected);
        Ok(Self {
            resolution,
            sdf: samples,
            volume,
        })
    }

    /// CPU reference of the GPU sampler, used by tests.
    ///
    /// Returns `(gradient, signed_distance, volume_fraction)` at `p`. For
    /// each axis, the corner lattice plus that axis's edge samples are
    /// evaluated with a quadratic B-spline stencil (three nodes, spacing
    /// h/3) along the axis and linear hats across; the three axis
    /// evaluations are averaged. The scheme has linear precision, so plane
    /// SDFs are reproduced exactly.
    pub fn eval(&self, p: Point3<f32>) -> (Vector3<f32>, f32, f32) {
        let mut grad = Vector3::zeros();
        let mut dist = 0.0;
        let mut vol = 0.0;
        for axis in 0..3 {
            let (g, d) = self.eval_axis(axis, p, &self.sdf);
            let (_, v) = self.eval_axis(axis, p, &self.volume);
            grad += g;
            dist += d;
            vol += v;
        }
        (grad / 3.0, dist / 3.0, vol / 3.0)
    }

    /// Sample of the lattice refined along `axis`, at refined coordinate
    /// `fine` (in `[0, 3·R_axis]`) and corner coordinates on the other axes.
    fn refined_sample(&self, axis: usize, fine: u32, b: u32, c: u32, block: &[f32]) -> f32 {
        let [rx, ry, rz] = self.resolution;
        let corners = ((rx + 1) * (ry + 1) * (rz + 1)) as usize;
        let ex = (2 * rx * (ry + 1) * (rz + 1)) as usize;
        let ey = ((rx + 1) * 2 * ry * (rz + 1)) as usize;

        // (fine, b, c) maps back to (i, j, k) with the refined axis first.
        let (i, j, k) = match axis {
            0 => (fine, b, c),
            1 => (b, fine, c),
            _ => (b, c, fine),
        };

        let corner =
            |i: u32, j: u32, k: u32| (i + (rx + 1) * (j + (ry + 1) * k)) as usize;
        let (cell, sub) = (fine / 3, fine % 3);
        if sub == 0 {
            let (i, j, k) = match axis {
                0 => (cell, b, c),
                1 => (b, cell, c),
                _ => (b, c, cell),
            };
            return block[corner(i, j, k)];
        }

        let e = 2 * cell + (sub - 1);
        let idx = match axis {
            0 => corners + (e + 2 * rx * (j + (ry + 1) * k)) as usize,
            1 => corners + ex + (i + (rx + 1) * (e + 2 * ry * k)) as usize,
            _ => corners + ex + ey + (i + (rx + 1) * (j + (ry + 1) * e)) as usize,
        };
        block[idx]
    }

    fn eval_axis(&self, axis: usize, p: Point3<f32>, block: &[f32]) -> (Vector3<f32>, f32) {
        let res = self.resolution;
        let r_axis = res[axis] as f32;
        let coords = [p.x, p.y, p.z];

        // Quadratic B-spline stencil along the refined axis.
        let fine_len = 3.0 * r_axis;
        let u = coords[axis] * fine_len;
        let center = (u + 0.5).floor().clamp(0.0, fine_len) as i64;
        let f = u - center as f32;
        let wq = [
            0.5 * (0.5 - f) * (0.5 - f),
            0.75 - f * f,
            0.5 * (0.5 + f) * (0.5 + f),
        ];
        let dq = [f - 0.5, -2.0 * f, f + 0.5];

        // Linear hats across the two transverse axes.
        let (b_axis, c_axis) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let transverse = |a: usize| {
            let r = res[a] as f32;
            let v = coords[a] * r;
            let base = v.floor().clamp(0.0, r - 1.0);
            (base as u32, v - base, r)
        };
        let (jb, fb, rb) = transverse(b_axis);
        let (kb, fc, rc) = transverse(c_axis);
        let wb = [1.0 - fb, fb];
        let wc = [1.0 - fc, fc];

        let mut value = 0.0;
        let mut grad = Vector3::zeros();
        for (qi, (wqi, dqi)) in wq.iter().zip(dq.iter()).enumerate() {
            let fine = (center - 1 + qi as i64).clamp(0, fine_len as i64) as u32;
            for (bi, wbi) in wb.iter().enumerate() {
                for (ci, wci) in wc.iter().enumerate() {
                    let s = self.refined_sample(
                        axis,
                        fine,
                        jb + bi as u32,
                        kb + ci as u32,
                        block,
                    );
                    value += wqi * wbi * wci * s;
                    grad[axis] += dqi * fine_len * wbi * wci * s;
                    grad[b_axis] +=
                        wqi * if bi == 0 { -rb } else { rb } * wci * s;
                    grad[c_axis] +=
                        wqi * wbi * if ci == 0 { -rc } else { rc } * s;
                }
            }
        }
        (grad, value)
    }
}

/// Field metadata shared with the contact-sampling kernel.
#[derive(Copy, Clone, PartialEq, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct BoundaryFieldMetadata {
    pub resolution: [u32; 3],
    /// Non-zero once a field payload has been uploaded.
    pub loaded: u32,
}

/// GPU-resident boundary field. Immutable after upload except for
/// [`Self::clear`].
pub struct GpuBoundaryField<B: Backend> {
    pub meta_cpu: BoundaryFieldMetadata,
    pub meta: GpuScalar<BoundaryFieldMetadata, B>,
    pub sdf: GpuVector<f32, B>,
    pub volume: GpuVector<f32, B>,
}

impl<B: Backend> GpuBoundaryField<B> {
    /// Placeholder field used until a payload is loaded; the contact pass is
    /// skipped entirely while `loaded` is zero.
    pub fn empty(backend: &B) -> Result<Self, B::Error> {
        let meta_cpu = BoundaryFieldMetadata {
            resolution: [0; 3],
            loaded: 0,
        };
        Ok(Self {
            meta_cpu,
            meta: GpuScalar::scalar(
                backend,
                meta_cpu,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            )?,
            sdf: GpuVector::vector(backend, &[0.0f32], BufferUsages::STORAGE | BufferUsages::COPY_DST)?,
            volume: GpuVector::vector(backend, &[0.0f32], BufferUsages::STORAGE | BufferUsages::COPY_DST)?,
        })
    }

    pub fn upload(backend: &B, field: &BoundaryField) -> Result<Self, B::Error> {
        let meta_cpu = BoundaryFieldMetadata {
            resolution: field.resolution,
            loaded: 1,
        };
        log::info!(
            "uploading boundary field {}×{}×{} ({} samples per block)",
            field.resolution[0],
            field.resolution[1],
            field.resolution[2],
            field.sdf.len()
        );
        Ok(Self {
            meta_cpu,
            meta: GpuScalar::scalar(
                backend,
                meta_cpu,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            )?,
            sdf: GpuVector::vector(
                backend,
                &field.sdf,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            )?,
            volume: GpuVector::vector(
                backend,
                &field.volume,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            )?,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.meta_cpu.loaded != 0
    }

    /// Zeroes the field buffers and marks the field as unloaded.
    pub fn clear(&mut self, backend: &B) -> Result<(), B::Error> {
        self.meta_cpu.loaded = 0;
        backend.write_buffer(self.meta.buffer_mut(), 0, &[self.meta_cpu])?;
        let sdf_zeros = vec![0.0f32; self.sdf.len() as usize];
        backend.write_buffer(self.sdf.buffer_mut(), 0, &sdf_zeros)?;
        let volume_zeros = vec![0.0f32; self.volume.len() as usize];
        backend.write_buffer(self.volume.buffer_mut(), 0, &volume_zeros)?;
        Ok(())
    }
}

/// Kernel refreshing per-particle virtual boundary contacts.
///
/// Runs once per constraint iteration: the contact can change as the
/// predicted position is corrected.
#[derive(Shader)]
#[shader(module = "ripple::solver::boundary")]
pub struct WgBoundarySample<B: Backend> {
    update_contacts: GpuFunction<B>,
}

#[derive(ShaderArgs)]
struct BoundarySampleArgs<'a, B: Backend> {
    params: &'a GpuScalar<SimulationParams, B>,
    field_meta: &'a GpuScalar<BoundaryFieldMetadata, B>,
    field_sdf: &'a GpuVector<f32, B>,
    field_volume: &'a GpuVector<f32, B>,
    predicted: &'a GpuVector<ParticlePosition, B>,
    boundary_contacts: &'a GpuVector<ParticlePosition, B>,
    particles_len: &'a GpuScalar<u32, B>,
}

impl<B: Backend> WgBoundarySample<B> {
    pub fn launch(
        &self,
        backend: &B,
        pass: &mut B::Pass,
        sim_params: &GpuSimulationParams<B>,
        field: &GpuBoundaryField<B>,
        particles: &GpuParticles<B>,
    ) -> Result<(), B::Error> {
        // Without a loaded field the contacts stay at their zeroed state and
        // every boundary term downstream is a no-op.
        if !field.is_loaded() {
            return Ok(());
        }

        let args = BoundarySampleArgs {
            params: &sim_params.params,
            field_meta: &field.meta,
            field_sdf: &field.sdf,
            field_volume: &field.volume,
            predicted: particles.predicted(),
            boundary_contacts: particles.boundary_contacts(),
            particles_len: particles.gpu_len(),
        };
        self.update_contacts
            .launch(backend, pass, &args, [particles.len() as u32, 1, 1])
    }
}

#[cfg(test)]
mod test {
    use super::{BoundaryField, GpuBoundaryField, WgBoundarySample};
    use crate::solver::{GpuParticles, GpuSimulationParams, Particle, ParticlePosition, SolverConfig};
    use crate::SimError;
    use approx::assert_relative_eq;
    use nalgebra::{point, Vector3};
    use slang_hal::backend::{Backend, Encoder, WebGpu};
    use slang_hal::re_exports::minislang::SlangCompiler;
    use slang_hal::{BufferUsages, Shader};
    use std::convert::Infallible;
    use std::fmt::Write;
    use stensor::tensor::GpuVector;

    /// Builds the payload for an analytic field: SDF = distance above the
    /// y = `plane_y` plane, volume 1 below it, 0 above.
    fn plane_payload(res: [u32; 3], plane_y: f32) -> String {
        let field = plane_field(res, plane_y);
        let mut out = format!("{} {} {}\n", res[0], res[1], res[2]);
        for s in field.sdf.iter().chain(field.volume.iter()) {
            writeln!(out, "{s}").unwrap();
        }
        out
    }

    fn plane_field(res: [u32; 3], plane_y: f32) -> BoundaryField {
        let expected = BoundaryField::expected_len(res);
        let mut field = BoundaryField {
            resolution: res,
            sdf: vec![0.0; expected],
            volume: vec![0.0; expected],
        };
        // Fill by writing every refined-lattice node of each axis family,
        // which touches each stored sample at least once.
        for axis in 0..3 {
            let (rb, rc) = match axis {
                0 => (res[1], res[2]),
                1 => (res[0], res[2]),
                _ => (res[0], res[1]),
            };
            for fine in 0..=3 * res[axis] {
                for b in 0..=rb {
                    for c in 0..=rc {
                        let fa = fine as f32 / (3.0 * res[axis] as f32);
                        let y = match axis {
                            0 => b as f32 / res[1] as f32,
                            1 => fa,
                            _ => c as f32 / res[1] as f32,
                        };
                        let sdf = y - plane_y;
                        let vol = if y < plane_y { 1.0 } else { 0.0 };
                        write_refined(&mut field, axis, fine, b, c, sdf, vol);
                    }
                }
            }
        }
        field
    }

    fn write_refined(
        field: &mut BoundaryField,
        axis: usize,
        fine: u32,
        b: u32,
        c: u32,
        sdf: f32,
        vol: f32,
    ) {
        let [rx, ry, rz] = field.resolution;
        let corners = ((rx + 1) * (ry + 1) * (rz + 1)) as usize;
        let ex = (2 * rx * (ry + 1) * (rz + 1)) as usize;
        let ey = ((rx + 1) * 2 * ry * (rz + 1)) as usize;
        let (cell, sub) = (fine / 3, fine % 3);
        let (i, j, k) = match axis {
            0 => (cell, b, c),
            1 => (b, cell, c),
            _ => (b, c, cell),
        };
        let idx = if sub == 0 {
            (i + (rx + 1) * (j + (ry + 1) * k)) as usize
        } else {
            let e = 2 * cell + (sub - 1);
            match axis {
                0 => corners + (e + 2 * rx * (j + (ry + 1) * k)) as usize,
                1 => corners + ex + (i + (rx + 1) * (e + 2 * ry * k)) as usize,
                _ => corners + ex + ey + (i + (rx + 1) * (j + (ry + 1) * e)) as usize,
            }
        };
        field.sdf[idx] = sdf;
        field.volume[idx] = vol;
    }

    #[test]
    fn parses_and_rejects_payloads() {
        let res = [4u32, 4, 4];
        let payload = plane_payload(res, 0.5);
        let field = BoundaryField::parse::<Infallible>(&payload).unwrap();
        assert_eq!(field.resolution, res);
        assert_eq!(field.sdf.len(), BoundaryField::expected_len(res));

        // Truncated payload.
        let truncated: String = payload
            .split_whitespace()
            .take(100)
            .collect::<Vec<_>>()
            .join(" ");
        let err = BoundaryField::parse::<Infallible>(&truncated).unwrap_err();
        assert!(matches!(err, SimError::BoundaryFieldFormat(_)));

        // Extra trailing samples.
        let extended = format!("{payload} 1.0");
        let err = BoundaryField::parse::<Infallible>(&extended).unwrap_err();
        assert!(matches!(err, SimError::BoundaryFieldFormat(_)));

        // Garbage header.
        let err = BoundaryField::parse::<Infallible>("4 four 4 0.0").unwrap_err();
        assert!(matches!(err, SimError::BoundaryFieldFormat(_)));
    }

    #[futures_test::test]
    #[serial_test::serial]
    async fn gpu_contacts_match_cpu_eval() {
        let gpu = match WebGpu::new(Default::default(), wgpu::Limits::default()).await {
            Ok(gpu) => gpu,
            Err(_) => return,
        };
        let mut compiler = SlangCompiler::default();
        crate::register_shaders(&mut compiler);
        let sampler = WgBoundarySample::from_backend(&gpu, &compiler).unwrap();

        let config = SolverConfig {
            particle_radius: 0.01,
            ..SolverConfig::default()
        };
        let search_radius = 0.1f32;
        let sim_params =
            GpuSimulationParams::new(&gpu, config.to_params(search_radius, 0)).unwrap();

        let field_cpu = plane_field([8, 8, 8], 0.3);
        let field = GpuBoundaryField::upload(&gpu, &field_cpu).unwrap();

        // Just above the plane (contact), well above it (no contact: volume
        // vanishes), and below it (no contact: negative distance).
        let probes = [
            point![0.4, 0.32, 0.6],
            point![0.5, 0.33, 0.5],
            point![0.5, 0.6, 0.5],
            point![0.5, 0.25, 0.5],
        ];
        let particles: Vec<_> = probes.iter().map(|p| Particle::new(*p)).collect();
        let mut gpu_particles = GpuParticles::with_capacity(&gpu, 16).unwrap();
        gpu_particles.set_particles(&gpu, &particles).unwrap();

        let mut encoder = gpu.begin_encoding();
        {
            let mut pass = encoder.begin_pass();
            sampler
                .launch(&gpu, &mut pass, &sim_params, &field, &gpu_particles)
                .unwrap();
        }
        gpu.submit(encoder).unwrap();
        gpu.synchronize().unwrap();

        let mut staging: GpuVector<ParticlePosition, WebGpu> = GpuVector::vector_uninit(
            &gpu,
            probes.len() as u32,
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        )
        .unwrap();
        let mut encoder = gpu.begin_encoding();
        staging
            .copy_from_view(&mut encoder, gpu_particles.boundary_contacts())
            .unwrap();
        gpu.submit(encoder).unwrap();
        gpu.synchronize().unwrap();
        let mut contacts = vec![ParticlePosition::zeros(); probes.len()];
        gpu.read_buffer(staging.buffer(), &mut contacts).await.unwrap();

        for (p, contact) in probes.iter().zip(contacts.iter()) {
            let (grad, dist, vol) = field_cpu.eval(*p);
            let expect_contact =
                dist > 0.0 && dist < search_radius && vol > 0.0 && grad.norm() > 1.0e-6;
            assert_eq!(
                contact.w > 0.0,
                expect_contact,
                "contact presence mismatch at {p:?}: {contact:?}"
            );
            if expect_contact {
                let n = grad.normalize();
                let d = (dist + 0.5 * config.particle_radius).max(2.0 * config.particle_radius);
                let expected = p - d * n;
                assert_relative_eq!(contact.x, expected.x, epsilon = 1.0e-3);
                assert_relative_eq!(contact.y, expected.y, epsilon = 1.0e-3);
                assert_relative_eq!(contact.z, expected.z, epsilon = 1.0e-3);
                assert_relative_eq!(contact.w, vol, epsilon = 1.0e-3);
            }
        }
    }

    #[test]
    fn plane_sdf_round_trip() {
        let field = plane_field([4, 4, 4], 0.5);

        // Grid-aligned and interior points: the stencil has linear
        // precision, so the plane SDF and its gradient are exact up to
        // rounding.
        for p in [
            point![0.25, 0.25, 0.25],
            point![0.5, 0.5, 0.5],
            point![0.3, 0.65, 0.45],
            point![0.75, 0.1, 0.2],
        ] {
            let (grad, dist, vol) = field.eval(p);
            assert_relative_eq!(dist, p.y - 0.5, epsilon = 1.0e-4);
            assert_relative_eq!(grad, Vector3::new(0.0, 1.0, 0.0), epsilon = 1.0e-3);
            if p.y < 0.4 {
                assert!(vol > 0.0, "volume should be positive inside at {p:?}");
            }
            if p.y > 0.6 {
                assert!(vol.abs() < 1.0e-3, "volume should vanish outside at {p:?}");
            }
        }
    }
}
