//! Deferred rendering: G-buffer population plus a directional-light resolve
//! into the main target.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use ember_core::profiling::profile_function;
use ember_test_utils::{
    BlendMode, BufferDesc, BufferKind, ColorMask, CullMode, DepthMode, GpuBuffer, GpuPipeline,
    GpuSampler, GraphicsDevice, IndexFormat, PassDesc, PassTarget, PipelineDesc, TextureFormat,
    VertexAttribute, VertexFormat,
};

use crate::camera::{CameraInfo, FrameUniforms};
use crate::effect::{EffectCache, EffectDesc, EffectRef};
use crate::material::TextureSlot;
use crate::mesh::{Renderable, MESH_VERTEX_ATTRIBUTES, MESH_VERTEX_STRIDE};
use crate::sampler_cache::SamplerCache;
use crate::target::{RenderTarget, RenderTargetDesc, MAIN_TARGET_FORMAT};
use crate::texture::Texture2D;

use super::{object_uniforms, ObjectRing, PassError, SceneStrategy, StrategyKind};

/// G-buffer attachment formats: albedo, encoded normal, world position.
const GBUFFER_FORMATS: [TextureFormat; 3] = [
    TextureFormat::Rgba8UnormSrgb,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba16Float,
];

/// Fullscreen-triangle vertex for the resolve pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ResolveVertex {
    position: [f32; 2],
    texcoord: [f32; 2],
}

const RESOLVE_VERTEX_STRIDE: u64 = 16;
const RESOLVE_VERTEX_ATTRIBUTES: [VertexAttribute; 2] = [
    VertexAttribute {
        format: VertexFormat::Float32x2,
        offset: 0,
        location: 0,
    },
    VertexAttribute {
        format: VertexFormat::Float32x2,
        offset: 8,
        location: 1,
    },
];

/// One triangle covering the whole target in NDC.
const FULLSCREEN_TRIANGLE: [ResolveVertex; 3] = [
    ResolveVertex {
        position: [-1.0, -1.0],
        texcoord: [0.0, 1.0],
    },
    ResolveVertex {
        position: [3.0, -1.0],
        texcoord: [2.0, 1.0],
    },
    ResolveVertex {
        position: [-1.0, 3.0],
        texcoord: [0.0, -1.0],
    },
];

/// Deferred strategy: geometry populates a multi-attachment G-buffer, then a
/// fullscreen directional-light pass resolves it into the main target.
pub struct DeferredStrategy {
    gbuffer: RenderTarget,
    geometry_effect: EffectRef,
    resolve_effect: EffectRef,
    /// Geometry pipeline variants indexed by `[cull_back]`.
    geometry_pipelines: [GpuPipeline; 2],
    resolve_pipeline: GpuPipeline,
    resolve_vertices: GpuBuffer,
    resolve_indices: GpuBuffer,
    frame_uniforms: GpuBuffer,
    objects: ObjectRing,
    material_sampler: GpuSampler,
    resolve_sampler: GpuSampler,
    fallback: Texture2D,
    active: bool,
}

impl DeferredStrategy {
    /// Create the strategy, its G-buffer, and both pipelines.
    pub fn new(
        device: &dyn GraphicsDevice,
        effects: &mut EffectCache,
        samplers: &mut SamplerCache,
        width: u32,
        height: u32,
    ) -> Self {
        let gbuffer = RenderTarget::new(
            device,
            &RenderTargetDesc {
                label: "gbuffer",
                width,
                height,
                color_formats: &GBUFFER_FORMATS,
                depth: true,
            },
        );

        let geometry_source = include_str!("../shaders/gbuffer.wgsl");
        let geometry_effect = effects.get_or_create(
            device,
            &EffectDesc {
                label: "gbuffer_geometry",
                vertex_source: geometry_source,
                fragment_source: geometry_source,
                defines: &[],
                vertex_stride: MESH_VERTEX_STRIDE,
                vertex_attributes: &MESH_VERTEX_ATTRIBUTES,
            },
        );

        let geometry_variant = |label, cull: CullMode| {
            device.create_pipeline(&PipelineDesc {
                label,
                shader: geometry_effect.shader(),
                vertex_stride: geometry_effect.stride(),
                vertex_attributes: geometry_effect.attributes(),
                uniform_slots: 2,
                texture_slots: TextureSlot::COUNT as u32,
                blend: BlendMode::Opaque,
                color_mask: ColorMask::All,
                depth: DepthMode::ReadWrite,
                cull,
                color_formats: &GBUFFER_FORMATS,
            })
        };
        let geometry_pipelines = [
            geometry_variant("gbuffer_geometry", CullMode::None),
            geometry_variant("gbuffer_geometry_cull", CullMode::Back),
        ];

        let resolve_source = include_str!("../shaders/deferred_resolve.wgsl");
        let resolve_effect = effects.get_or_create(
            device,
            &EffectDesc {
                label: "deferred_resolve",
                vertex_source: resolve_source,
                fragment_source: resolve_source,
                defines: &[],
                vertex_stride: RESOLVE_VERTEX_STRIDE,
                vertex_attributes: &RESOLVE_VERTEX_ATTRIBUTES,
            },
        );

        let resolve_pipeline = device.create_pipeline(&PipelineDesc {
            label: "deferred_resolve",
            shader: resolve_effect.shader(),
            vertex_stride: resolve_effect.stride(),
            vertex_attributes: resolve_effect.attributes(),
            uniform_slots: 1,
            texture_slots: 3,
            blend: BlendMode::Opaque,
            color_mask: ColorMask::All,
            depth: DepthMode::Ignore,
            cull: CullMode::None,
            color_formats: &[MAIN_TARGET_FORMAT],
        });

        let resolve_vertices = device.create_buffer(&BufferDesc {
            label: "resolve_vertices",
            size: std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u64,
            kind: BufferKind::Vertex,
        });
        device.write_buffer(&resolve_vertices, 0, bytemuck::cast_slice(&FULLSCREEN_TRIANGLE));

        let resolve_indices = device.create_buffer(&BufferDesc {
            label: "resolve_indices",
            size: (3 * std::mem::size_of::<u16>()) as u64,
            kind: BufferKind::Index,
        });
        device.write_buffer(&resolve_indices, 0, bytemuck::cast_slice(&[0u16, 1, 2]));

        let frame_uniforms = device.create_buffer(&BufferDesc {
            label: "deferred_frame_uniforms",
            size: std::mem::size_of::<FrameUniforms>() as u64,
            kind: BufferKind::Uniform,
        });

        Self {
            gbuffer,
            geometry_effect,
            resolve_effect,
            geometry_pipelines,
            resolve_pipeline,
            resolve_vertices,
            resolve_indices,
            frame_uniforms,
            objects: ObjectRing::new(device, "deferred_object_uniforms"),
            material_sampler: samplers.linear_repeat(device),
            resolve_sampler: samplers.linear_clamp(device),
            fallback: Texture2D::white(device),
            active: false,
        }
    }

    /// The G-buffer target (albedo, normal, position + depth).
    pub fn gbuffer(&self) -> &RenderTarget {
        &self.gbuffer
    }
}

impl SceneStrategy for DeferredStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Deferred
    }

    fn begin_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        camera: &CameraInfo,
        _main: &RenderTarget,
    ) -> Result<(), PassError> {
        profile_function!();
        if self.active {
            tracing::error!("deferred begin_pass() while a pass is active");
            return Err(PassError::AlreadyActive);
        }

        device.write_buffer(
            &self.frame_uniforms,
            0,
            bytemuck::bytes_of(&FrameUniforms::from_camera(camera)),
        );
        self.objects.reset(device);

        device.begin_pass(&PassDesc {
            label: "gbuffer_geometry",
            target: PassTarget::Framebuffer(self.gbuffer.framebuffer()),
            clear_color: Some([0.0, 0.0, 0.0, 0.0]),
            clear_depth: Some(1.0),
        });

        self.active = true;
        Ok(())
    }

    fn draw_renderable(
        &mut self,
        device: &dyn GraphicsDevice,
        renderable: &Renderable,
        world: Mat4,
    ) -> Result<(), PassError> {
        if !self.active {
            tracing::error!("deferred draw_renderable() without an active pass");
            return Err(PassError::NotActive);
        }

        let (Some(vertex_buffer), Some(index_buffer)) =
            (renderable.vertex_buffer(), renderable.index_buffer())
        else {
            tracing::warn!("skipping destroyed renderable");
            return Ok(());
        };

        let material = renderable.material();
        let cull_back = usize::from(material.cull == CullMode::Back);
        device.set_pipeline(&self.geometry_pipelines[cull_back]);

        let offset = self.objects.push(device, &object_uniforms(renderable, world));
        device.set_uniform_buffer(0, &self.frame_uniforms, 0);
        device.set_uniform_buffer(1, self.objects.buffer(), offset);

        for slot in [
            TextureSlot::Albedo,
            TextureSlot::Normal,
            TextureSlot::Metallic,
            TextureSlot::Roughness,
            TextureSlot::AmbientOcclusion,
        ] {
            let texture = material
                .texture(slot)
                .map_or_else(|| self.fallback.gpu(), Texture2D::gpu);
            device.set_texture(slot.index() as u32, texture, &self.material_sampler);
        }

        device.set_vertex_buffer(vertex_buffer);
        device.set_index_buffer(index_buffer, IndexFormat::Uint32);
        device.draw_indexed(renderable.index_count());
        Ok(())
    }

    fn end_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        main: &RenderTarget,
    ) -> Result<(), PassError> {
        profile_function!();
        if !self.active {
            tracing::error!("deferred end_pass() without an active pass");
            return Err(PassError::NotActive);
        }
        device.end_pass();

        // Resolve the G-buffer into the main target with one fullscreen
        // directional-light draw.
        device.begin_pass(&PassDesc {
            label: "deferred_resolve",
            target: PassTarget::Framebuffer(main.framebuffer()),
            clear_color: None,
            clear_depth: None,
        });
        device.set_pipeline(&self.resolve_pipeline);
        device.set_uniform_buffer(0, &self.frame_uniforms, 0);
        for (slot, attachment) in self.gbuffer.framebuffer().color_attachments().iter().enumerate()
        {
            device.set_texture(slot as u32, attachment, &self.resolve_sampler);
        }
        device.set_vertex_buffer(&self.resolve_vertices);
        device.set_index_buffer(&self.resolve_indices, IndexFormat::Uint16);
        device.draw_indexed(3);
        device.end_pass();

        self.active = false;
        Ok(())
    }

    fn resize(&mut self, device: &dyn GraphicsDevice, width: u32, height: u32) {
        self.gbuffer.resize(device, width, height);
    }

    fn dispose(mut self: Box<Self>, device: &dyn GraphicsDevice, effects: &mut EffectCache) {
        device.destroy_buffer(self.resolve_vertices);
        device.destroy_buffer(self.resolve_indices);
        device.destroy_buffer(self.frame_uniforms);
        self.objects.dispose(device);
        self.gbuffer.destroy(device);
        self.fallback.destroy(device);
        for key in [self.geometry_effect.key(), self.resolve_effect.key()] {
            if let Err(e) = effects.release(device, key) {
                tracing::error!(error = %e, "failed to release deferred effect");
            }
        }
    }
}
