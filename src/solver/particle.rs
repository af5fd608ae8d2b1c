use crate::SimError;
use nalgebra::{Point3, Vector3, Vector4};
use slang_hal::backend::Backend;
use slang_hal::BufferUsages;
use stensor::tensor::{GpuScalar, GpuTensor, GpuVector};

/// Buffer element for positions and every other per-particle vec4 quantity.
///
/// The `w` lane packs a scalar next to the vector for cache locality:
/// density for (predicted) positions, vorticity magnitude for angular
/// velocities, contact volume for boundary contacts.
pub type ParticlePosition = Vector4<f32>;

/// CPU-side seed state for a single fluid particle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Particle {
    pub position: Point3<f32>,
    pub velocity: Vector3<f32>,
}

impl Particle {
    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position,
            velocity: Vector3::zeros(),
        }
    }

    pub fn with_velocity(position: Point3<f32>, velocity: Vector3<f32>) -> Self {
        Self { position, velocity }
    }
}

/// GPU buffers storing all particle state in structure-of-arrays layout.
///
/// Buffers are allocated once at a fixed capacity; only the logical count
/// changes afterwards. The solver owns these buffers exclusively — the
/// renderer reads `positions` and nothing else.
pub struct GpuParticles<B: Backend> {
    capacity: usize,
    len: usize,
    gpu_len: GpuScalar<u32, B>,
    /// Authoritative positions, density packed in `w`.
    positions: GpuVector<ParticlePosition, B>,
    /// Working positions during one step's constraint iterations.
    predicted: GpuVector<ParticlePosition, B>,
    velocities: GpuVector<ParticlePosition, B>,
    /// Vorticity + surface-tension forces for the next step's integration.
    accelerations: GpuVector<ParticlePosition, B>,
    /// Vorticity estimate, magnitude in `w`.
    angular_velocities: GpuVector<ParticlePosition, B>,
    /// Surface-normal estimate for the cohesion/curvature terms.
    normals: GpuVector<ParticlePosition, B>,
    /// Position corrections (and XSPH velocity deltas, reused between
    /// dispatches of the same pass group).
    deltas: GpuVector<ParticlePosition, B>,
    lambdas: GpuVector<f32, B>,
    /// Virtual boundary contact point, contact volume in `w` (zero volume =
    /// no contact).
    boundary_contacts: GpuVector<ParticlePosition, B>,
}

impl<B: Backend> GpuParticles<B> {
    pub fn with_capacity(backend: &B, capacity: u32) -> Result<Self, B::Error> {
        let storage = BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST;
        let zeros = vec![ParticlePosition::zeros(); capacity as usize];
        Ok(Self {
            capacity: capacity as usize,
            len: 0,
            gpu_len: GpuTensor::scalar(
                backend,
                0u32,
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
            )?,
            positions: GpuTensor::vector(backend, &zeros, storage)?,
            predicted: GpuTensor::vector(backend, &zeros, storage)?,
            velocities: GpuTensor::vector(backend, &zeros, storage)?,
            accelerations: GpuTensor::vector(backend, &zeros, storage)?,
            angular_velocities: GpuTensor::vector(backend, &zeros, storage)?,
            normals: GpuTensor::vector(backend, &zeros, storage)?,
            deltas: GpuTensor::vector(backend, &zeros, storage)?,
            lambdas: GpuTensor::vector(backend, &vec![0.0f32; capacity as usize], storage)?,
            boundary_contacts: GpuTensor::vector(backend, &zeros, storage)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn gpu_len(&self) -> &GpuScalar<u32, B> {
        &self.gpu_len
    }

    /// Replaces the whole particle population.
    ///
    /// Clears every derived buffer, so this doubles as the seeding path after
    /// a [`Self::reset`].
    pub fn set_particles(
        &mut self,
        backend: &B,
        particles: &[Particle],
    ) -> Result<(), SimError<B::Error>> {
        let positions: Vec<_> = particles.iter().map(|p| p.position).collect();
        let velocities: Vec<_> = particles.iter().map(|p| p.velocity).collect();
        self.set_state(backend, &positions, &velocities)
    }

    /// Replaces positions and velocities from parallel arrays.
    ///
    /// The arrays must have the same length; a mismatch is a configuration
    /// error raised before any buffer write.
    pub fn set_state(
        &mut self,
        backend: &B,
        positions: &[Point3<f32>],
        velocities: &[Vector3<f32>],
    ) -> Result<(), SimError<B::Error>> {
        if positions.len() != velocities.len() {
            return Err(SimError::PositionCountMismatch {
                positions: positions.len(),
                velocities: velocities.len(),
            });
        }
        if positions.len() > self.capacity {
            return Err(SimError::CapacityExceeded {
                count: positions.len(),
                capacity: self.capacity,
            });
        }

        self.reset(backend)?;

        let pos: Vec<ParticlePosition> = positions
            .iter()
            .map(|p| Vector4::new(p.x, p.y, p.z, 0.0))
            .collect();
        let vel: Vec<ParticlePosition> = velocities
            .iter()
            .map(|v| Vector4::new(v.x, v.y, v.z, 0.0))
            .collect();
        backend.write_buffer(self.positions.buffer_mut(), 0, &pos)?;
        backend.write_buffer(self.predicted.buffer_mut(), 0, &pos)?;
        backend.write_buffer(self.velocities.buffer_mut(), 0, &vel)?;

        self.len = positions.len();
        backend.write_buffer(self.gpu_len.buffer_mut(), 0, &[self.len as u32])?;
        Ok(())
    }

    /// Appends positions produced by an external voxelization routine.
    ///
    /// New particles start at rest. Appending past the fixed capacity is a
    /// configuration error; nothing is written in that case.
    pub fn append_particles(
        &mut self,
        backend: &B,
        positions: &[Point3<f32>],
    ) -> Result<(), SimError<B::Error>> {
        let count = self.len + positions.len();
        if count > self.capacity {
            return Err(SimError::CapacityExceeded {
                count,
                capacity: self.capacity,
            });
        }

        let pos: Vec<ParticlePosition> = positions
            .iter()
            .map(|p| Vector4::new(p.x, p.y, p.z, 0.0))
            .collect();
        let zeros = vec![ParticlePosition::zeros(); positions.len()];
        let offset = self.len as u64;
        backend.write_buffer(self.positions.buffer_mut(), offset, &pos)?;
        backend.write_buffer(self.predicted.buffer_mut(), offset, &pos)?;
        backend.write_buffer(self.velocities.buffer_mut(), offset, &zeros)?;
        backend.write_buffer(self.accelerations.buffer_mut(), offset, &zeros)?;

        self.len = count;
        backend.write_buffer(self.gpu_len.buffer_mut(), 0, &[self.len as u32])?;
        Ok(())
    }

    /// Clears the logical count and zeroes every buffer.
    pub fn reset(&mut self, backend: &B) -> Result<(), B::Error> {
        let zeros = vec![ParticlePosition::zeros(); self.capacity];
        backend.write_buffer(self.positions.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.predicted.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.velocities.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.accelerations.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.angular_velocities.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.normals.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.deltas.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.boundary_contacts.buffer_mut(), 0, &zeros)?;
        backend.write_buffer(self.lambdas.buffer_mut(), 0, &vec![0.0f32; self.capacity])?;

        self.len = 0;
        backend.write_buffer(self.gpu_len.buffer_mut(), 0, &[0u32])?;
        Ok(())
    }

    /// Renderer-facing position buffer (density packed in `w`).
    pub fn positions(&self) -> &GpuVector<ParticlePosition, B> {
        &self.positions
    }

    pub fn predicted(&self) -> &GpuVector<ParticlePosition, B> {
        &self.predicted
    }

    pub fn velocities(&self) -> &GpuVector<ParticlePosition, B> {
        &self.velocities
    }

    pub fn accelerations(&self) -> &GpuVector<ParticlePosition, B> {
        &self.accelerations
    }

    pub fn angular_velocities(&self) -> &GpuVector<ParticlePosition, B> {
        &self.angular_velocities
    }

    pub fn normals(&self) -> &GpuVector<ParticlePosition, B> {
        &self.normals
    }

    pub fn deltas(&self) -> &GpuVector<ParticlePosition, B> {
        &self.deltas
    }

    pub fn lambdas(&self) -> &GpuVector<f32, B> {
        &self.lambdas
    }

    pub fn boundary_contacts(&self) -> &GpuVector<ParticlePosition, B> {
        &self.boundary_contacts
    }
}
