//! Pluggable 3D submission strategies.
//!
//! Both strategies implement the same begin-pass/draw/end-pass contract; the
//! forward path renders straight into the main target, while the deferred
//! path populates a G-buffer and resolves it into the main target at pass
//! end. One strategy is selected at renderer construction.

mod deferred;
mod forward;

pub use deferred::DeferredStrategy;
pub use forward::ForwardStrategy;

use std::fmt;

use glam::Mat4;

use ember_test_utils::{BufferDesc, BufferKind, GpuBuffer, GraphicsDevice};

use crate::camera::{CameraInfo, ObjectUniforms};
use crate::effect::EffectCache;
use crate::mesh::Renderable;
use crate::target::RenderTarget;

/// Which 3D submission strategy a renderer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Forward,
    Deferred,
}

/// Pass-state contract violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// `begin_pass` called while a pass is already active.
    AlreadyActive,
    /// `draw_renderable` or `end_pass` called with no active pass.
    NotActive,
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::AlreadyActive => write!(f, "scene pass already active"),
            PassError::NotActive => write!(f, "scene pass not active"),
        }
    }
}

impl std::error::Error for PassError {}

/// The 3D draw contract shared by the forward and deferred paths.
pub trait SceneStrategy {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Open the scene pass: bind and clear the strategy's target, upload the
    /// camera uniforms. Fails with [`PassError::AlreadyActive`] when nested.
    fn begin_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        camera: &CameraInfo,
        main: &RenderTarget,
    ) -> Result<(), PassError>;

    /// Upload the per-object uniform block, bind the renderable's material
    /// textures at their fixed slots, and issue one indexed draw.
    fn draw_renderable(
        &mut self,
        device: &dyn GraphicsDevice,
        renderable: &Renderable,
        world: Mat4,
    ) -> Result<(), PassError>;

    /// Close the scene pass. Fails with [`PassError::NotActive`] when no
    /// pass is open.
    fn end_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        main: &RenderTarget,
    ) -> Result<(), PassError>;

    /// Recreate any fixed-size attachments after a surface resize.
    fn resize(&mut self, device: &dyn GraphicsDevice, width: u32, height: u32);

    /// Release all GPU resources and effect references.
    fn dispose(self: Box<Self>, device: &dyn GraphicsDevice, effects: &mut EffectCache);
}

/// Byte stride between per-object uniform blocks; matches the minimum
/// dynamic-offset alignment.
pub(crate) const OBJECT_UNIFORM_STRIDE: u64 = 256;

const INITIAL_RING_CAPACITY: u32 = 1024;

/// A growable uniform ring holding one [`ObjectUniforms`] block per draw,
/// bound with a dynamic offset.
///
/// Growth mid-pass allocates a replacement buffer; the outgrown one is
/// retired and destroyed at the next reset, after its commands have been
/// submitted.
pub(crate) struct ObjectRing {
    buffer: GpuBuffer,
    capacity: u32,
    cursor: u32,
    retired: Vec<GpuBuffer>,
    label: &'static str,
}

impl ObjectRing {
    pub(crate) fn new(device: &dyn GraphicsDevice, label: &'static str) -> Self {
        let buffer = device.create_buffer(&BufferDesc {
            label,
            size: INITIAL_RING_CAPACITY as u64 * OBJECT_UNIFORM_STRIDE,
            kind: BufferKind::Uniform,
        });
        Self {
            buffer,
            capacity: INITIAL_RING_CAPACITY,
            cursor: 0,
            retired: Vec::new(),
            label,
        }
    }

    /// Start a new pass: rewind the cursor and destroy retired buffers.
    pub(crate) fn reset(&mut self, device: &dyn GraphicsDevice) {
        self.cursor = 0;
        for buffer in self.retired.drain(..) {
            device.destroy_buffer(buffer);
        }
    }

    /// Write one object block, growing the ring if full. Returns the byte
    /// offset to bind with.
    pub(crate) fn push(&mut self, device: &dyn GraphicsDevice, uniforms: &ObjectUniforms) -> u64 {
        if self.cursor == self.capacity {
            let grown = device.create_buffer(&BufferDesc {
                label: self.label,
                size: (self.capacity as u64 * 2) * OBJECT_UNIFORM_STRIDE,
                kind: BufferKind::Uniform,
            });
            let outgrown = std::mem::replace(&mut self.buffer, grown);
            self.retired.push(outgrown);
            self.capacity *= 2;
            self.cursor = 0;
            tracing::debug!(label = self.label, capacity = self.capacity, "grew object ring");
        }

        let offset = self.cursor as u64 * OBJECT_UNIFORM_STRIDE;
        device.write_buffer(&self.buffer, offset, bytemuck::bytes_of(uniforms));
        self.cursor += 1;
        offset
    }

    pub(crate) fn buffer(&self) -> &GpuBuffer {
        &self.buffer
    }

    pub(crate) fn dispose(self, device: &dyn GraphicsDevice) {
        device.destroy_buffer(self.buffer);
        for buffer in self.retired {
            device.destroy_buffer(buffer);
        }
    }
}

/// Build the per-object uniform block for a renderable.
pub(crate) fn object_uniforms(renderable: &Renderable, world: Mat4) -> ObjectUniforms {
    let material = renderable.material();
    ObjectUniforms {
        world: world.to_cols_array_2d(),
        tint: material.tint.to_array(),
        params: [material.tiling, 0.0, 0.0, 0.0],
    }
}
