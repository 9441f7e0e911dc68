//! GPU-resident meshes for 3D geometry.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use ember_test_utils::{
    BufferDesc, BufferKind, GpuBuffer, GraphicsDevice, VertexAttribute, VertexFormat,
};

use crate::material::Material;

/// Vertex format for 3D geometry: position, normal, texcoord.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

/// Byte stride of one mesh vertex.
pub const MESH_VERTEX_STRIDE: u64 = 32;
const_assert_eq!(std::mem::size_of::<MeshVertex>(), MESH_VERTEX_STRIDE as usize);

/// Input layout matching [`MeshVertex`].
pub const MESH_VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute {
        format: VertexFormat::Float32x3,
        offset: 0,
        location: 0,
    },
    VertexAttribute {
        format: VertexFormat::Float32x3,
        offset: 12,
        location: 1,
    },
    VertexAttribute {
        format: VertexFormat::Float32x2,
        offset: 24,
        location: 2,
    },
];

/// Raw vertex/index arrays handed over by the asset importer.
#[derive(Debug, Clone, Copy)]
pub struct MeshData<'a> {
    pub vertices: &'a [MeshVertex],
    pub indices: &'a [u32],
}

/// A persistent GPU-resident mesh plus a shared material reference.
///
/// Owns exactly one vertex buffer and one index buffer, created once with
/// immutable size. The material is shared, not owned; disposing it is the
/// creator's responsibility.
#[derive(Debug)]
pub struct Renderable {
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
    index_count: u32,
    material: Arc<Material>,
}

impl Renderable {
    /// Upload mesh data into new GPU buffers.
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        data: &MeshData,
        material: Arc<Material>,
    ) -> Self {
        let vertex_buffer = device.create_buffer(&BufferDesc {
            label,
            size: std::mem::size_of_val(data.vertices) as u64,
            kind: BufferKind::Vertex,
        });
        device.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(data.vertices));

        let index_buffer = device.create_buffer(&BufferDesc {
            label,
            size: std::mem::size_of_val(data.indices) as u64,
            kind: BufferKind::Index,
        });
        device.write_buffer(&index_buffer, 0, bytemuck::cast_slice(data.indices));

        tracing::debug!(
            label,
            vertices = data.vertices.len(),
            indices = data.indices.len(),
            "created renderable"
        );

        Self {
            vertex_buffer: Some(vertex_buffer),
            index_buffer: Some(index_buffer),
            index_count: data.indices.len() as u32,
            material,
        }
    }

    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// The shared material.
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// The vertex buffer, unless destroyed.
    pub fn vertex_buffer(&self) -> Option<&GpuBuffer> {
        self.vertex_buffer.as_ref()
    }

    /// The index buffer, unless destroyed.
    pub fn index_buffer(&self) -> Option<&GpuBuffer> {
        self.index_buffer.as_ref()
    }

    /// Whether the mesh buffers have been released.
    pub fn is_destroyed(&self) -> bool {
        self.vertex_buffer.is_none()
    }

    /// Release both GPU buffers. Idempotent.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            device.destroy_buffer(buffer);
        }
    }
}
