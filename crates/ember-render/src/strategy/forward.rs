//! Immediate forward rendering: single-target lit pass into the main target.

use glam::Mat4;

use ember_core::profiling::profile_function;
use ember_test_utils::{
    BlendMode, BufferDesc, BufferKind, ColorMask, CullMode, DepthMode, GpuBuffer, GpuPipeline,
    GpuSampler, GraphicsDevice, IndexFormat, PassDesc, PassTarget, PipelineDesc,
};

use crate::camera::{CameraInfo, FrameUniforms};
use crate::effect::{EffectCache, EffectDesc, EffectRef};
use crate::material::TextureSlot;
use crate::mesh::{Renderable, MESH_VERTEX_ATTRIBUTES, MESH_VERTEX_STRIDE};
use crate::sampler_cache::SamplerCache;
use crate::target::{RenderTarget, MAIN_TARGET_FORMAT};
use crate::texture::Texture2D;

use super::{object_uniforms, ObjectRing, PassError, SceneStrategy, StrategyKind};

/// Forward strategy: one lit draw per renderable, straight into the main
/// target. Trades lighting flexibility for simplicity.
pub struct ForwardStrategy {
    effect: EffectRef,
    /// Pipeline variants indexed by `[translucent][cull_back]`.
    pipelines: [[GpuPipeline; 2]; 2],
    frame_uniforms: GpuBuffer,
    objects: ObjectRing,
    sampler: GpuSampler,
    fallback: Texture2D,
    active: bool,
}

impl ForwardStrategy {
    /// Create the strategy and its pipeline variants.
    pub fn new(
        device: &dyn GraphicsDevice,
        effects: &mut EffectCache,
        samplers: &mut SamplerCache,
    ) -> Self {
        let source = include_str!("../shaders/forward.wgsl");
        let effect = effects.get_or_create(
            device,
            &EffectDesc {
                label: "forward_lit",
                vertex_source: source,
                fragment_source: source,
                defines: &[],
                vertex_stride: MESH_VERTEX_STRIDE,
                vertex_attributes: &MESH_VERTEX_ATTRIBUTES,
            },
        );

        let variant = |label, translucent: bool, cull: CullMode| {
            device.create_pipeline(&PipelineDesc {
                label,
                shader: effect.shader(),
                vertex_stride: effect.stride(),
                vertex_attributes: effect.attributes(),
                uniform_slots: 2,
                texture_slots: TextureSlot::COUNT as u32,
                blend: if translucent {
                    BlendMode::Alpha
                } else {
                    BlendMode::Opaque
                },
                color_mask: ColorMask::All,
                depth: if translucent {
                    DepthMode::ReadOnly
                } else {
                    DepthMode::ReadWrite
                },
                cull,
                color_formats: &[MAIN_TARGET_FORMAT],
            })
        };

        let pipelines = [
            [
                variant("forward_opaque", false, CullMode::None),
                variant("forward_opaque_cull", false, CullMode::Back),
            ],
            [
                variant("forward_translucent", true, CullMode::None),
                variant("forward_translucent_cull", true, CullMode::Back),
            ],
        ];

        let frame_uniforms = device.create_buffer(&BufferDesc {
            label: "forward_frame_uniforms",
            size: std::mem::size_of::<FrameUniforms>() as u64,
            kind: BufferKind::Uniform,
        });

        Self {
            effect,
            pipelines,
            frame_uniforms,
            objects: ObjectRing::new(device, "forward_object_uniforms"),
            sampler: samplers.linear_repeat(device),
            fallback: Texture2D::white(device),
            active: false,
        }
    }
}

impl SceneStrategy for ForwardStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Forward
    }

    fn begin_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        camera: &CameraInfo,
        main: &RenderTarget,
    ) -> Result<(), PassError> {
        profile_function!();
        if self.active {
            tracing::error!("forward begin_pass() while a pass is active");
            return Err(PassError::AlreadyActive);
        }

        device.write_buffer(
            &self.frame_uniforms,
            0,
            bytemuck::bytes_of(&FrameUniforms::from_camera(camera)),
        );
        self.objects.reset(device);

        // Color and depth were cleared by the frame setup; load both.
        device.begin_pass(&PassDesc {
            label: "forward_scene",
            target: PassTarget::Framebuffer(main.framebuffer()),
            clear_color: None,
            clear_depth: None,
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
            tracing::error!("forward draw_renderable() without an active pass");
            return Err(PassError::NotActive);
        }

        let (Some(vertex_buffer), Some(index_buffer)) =
            (renderable.vertex_buffer(), renderable.index_buffer())
        else {
            tracing::warn!("skipping destroyed renderable");
            return Ok(());
        };

        let material = renderable.material();
        let translucent = usize::from(material.translucent);
        let cull_back = usize::from(material.cull == CullMode::Back);
        device.set_pipeline(&self.pipelines[translucent][cull_back]);

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
            device.set_texture(slot.index() as u32, texture, &self.sampler);
        }

        device.set_vertex_buffer(vertex_buffer);
        device.set_index_buffer(index_buffer, IndexFormat::Uint32);
        device.draw_indexed(renderable.index_count());
        Ok(())
    }

    fn end_pass(
        &mut self,
        device: &dyn GraphicsDevice,
        _main: &RenderTarget,
    ) -> Result<(), PassError> {
        if !self.active {
            tracing::error!("forward end_pass() without an active pass");
            return Err(PassError::NotActive);
        }
        device.end_pass();
        self.active = false;
        Ok(())
    }

    fn resize(&mut self, _device: &dyn GraphicsDevice, _width: u32, _height: u32) {
        // No fixed-size attachments of its own; the main target is resized
        // by the pipeline.
    }

    fn dispose(self: Box<Self>, device: &dyn GraphicsDevice, effects: &mut EffectCache) {
        device.destroy_buffer(self.frame_uniforms);
        self.objects.dispose(device);
        self.fallback.destroy(device);
        if let Err(e) = effects.release(device, self.effect.key()) {
            tracing::error!(error = %e, "failed to release forward effect");
        }
    }
}
