//! wgpu implementation of the [`GraphicsDevice`] trait.
//!
//! Maps the device abstraction's D3D11-style slot bindings onto wgpu's
//! bind-group model: group 0 carries the uniform slots (dynamic offsets),
//! group 1 carries texture+sampler slot pairs. Bind groups are materialized
//! lazily at draw time and cached by the bound handle ids. Buffer writes go
//! through `Queue::write_buffer_with`, a mapped staging write, so partial
//! uploads never transfer more than the written range.

use std::num::NonZeroU64;
use std::sync::Mutex;

use ahash::HashMap;

use ember_core::profiling::profile_function;
use ember_test_utils::{
    BlendMode, BufferDesc, BufferKind, ColorMask, CullMode, DepthMode, DeviceError, DeviceResult,
    FilterMode, FramebufferDesc, GpuBuffer, GpuFramebuffer, GpuPipeline, GpuSampler, GpuShader,
    GpuTexture, GraphicsDevice, IndexFormat, PassDesc, PassTarget, PipelineDesc, PresentMode,
    SamplerDesc, ShaderDesc, TextureDesc, TextureFormat, VertexFormat,
};

use crate::context::{GraphicsContext, SurfaceContext};

const MAX_UNIFORM_SLOTS: usize = 4;
const MAX_TEXTURE_SLOTS: usize = 8;

/// Uniform bindings are capped at this size so dynamic offsets stay within
/// driver limits; it matches the per-object stride.
const MAX_UNIFORM_BINDING: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LayoutKind {
    Uniforms,
    Textures,
}

type LayoutKey = (LayoutKind, u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindGroupKey {
    kind: LayoutKind,
    resources: Vec<u64>,
}

struct PassState {
    pass: wgpu::RenderPass<'static>,
    /// (uniform, texture) slot counts of the bound pipeline.
    slots: (u32, u32),
    uniforms: [Option<(GpuBuffer, u64)>; MAX_UNIFORM_SLOTS],
    textures: [Option<(GpuTexture, GpuSampler)>; MAX_TEXTURE_SLOTS],
    uniforms_dirty: bool,
    textures_dirty: bool,
}

struct FrameState {
    encoder: Option<wgpu::CommandEncoder>,
    surface_texture: Option<wgpu::SurfaceTexture>,
    surface_view: Option<wgpu::TextureView>,
    pass: Option<PassState>,
}

struct DeviceState {
    surface: SurfaceContext,
    frame: Option<FrameState>,
    layouts: HashMap<LayoutKey, wgpu::BindGroupLayout>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,
    /// Slot counts per created pipeline, needed to size bind groups.
    pipeline_slots: HashMap<u64, (u32, u32)>,
}

/// [`GraphicsDevice`] backed by wgpu and a presentation surface.
pub struct WgpuDevice {
    context: &'static GraphicsContext,
    state: Mutex<DeviceState>,
}

impl WgpuDevice {
    /// Wrap a graphics context and a configured surface.
    pub fn new(context: &'static GraphicsContext, surface: SurfaceContext) -> Self {
        Self {
            context,
            state: Mutex::new(DeviceState {
                surface,
                frame: None,
                layouts: HashMap::default(),
                bind_groups: HashMap::default(),
                pipeline_slots: HashMap::default(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state
            .lock()
            .expect("device state lock poisoned - a thread panicked while recording")
    }
}

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn unmap_format(format: wgpu::TextureFormat) -> TextureFormat {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => TextureFormat::Rgba16Float,
        wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
        // Swapchains commonly report BGRA; treat anything else the same way.
        _ => TextureFormat::Bgra8UnormSrgb,
    }
}

fn map_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn map_present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Vsync => wgpu::PresentMode::Fifo,
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
    }
}

fn create_layout(device: &wgpu::Device, key: LayoutKey) -> wgpu::BindGroupLayout {
    let (kind, count) = key;
    let mut entries = Vec::new();
    match kind {
        LayoutKind::Uniforms => {
            for binding in 0..count {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                });
            }
        }
        LayoutKind::Textures => {
            for slot in 0..count {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: slot * 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding: slot * 2 + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                });
            }
        }
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("device_slot_layout"),
        entries: &entries,
    })
}

fn ensure_layout<'a>(
    device: &wgpu::Device,
    layouts: &'a mut HashMap<LayoutKey, wgpu::BindGroupLayout>,
    key: LayoutKey,
) -> &'a wgpu::BindGroupLayout {
    layouts.entry(key).or_insert_with(|| create_layout(device, key))
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> GpuBuffer {
        let usage = match desc.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            BufferKind::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage,
            mapped_at_creation: false,
        });
        GpuBuffer::from_wgpu(buffer)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        let Some(size) = NonZeroU64::new(data.len() as u64) else {
            return;
        };
        // Mapped staging write; only the given range is transferred.
        match self
            .context
            .queue
            .write_buffer_with(buffer.as_wgpu(), offset, size)
        {
            Some(mut view) => view.copy_from_slice(data),
            None => tracing::error!(offset, size = data.len(), "buffer write rejected"),
        }
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        buffer.as_wgpu().destroy();
    }

    fn create_texture(&self, desc: &TextureDesc, pixels: Option<&[u8]>) -> GpuTexture {
        let format = map_format(desc.format);
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_attachment {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        if let Some(data) = pixels {
            self.context.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture::from_wgpu(texture, view)
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        texture.as_wgpu().destroy();
    }

    fn create_shader(&self, desc: &ShaderDesc) -> GpuShader {
        profile_function!();
        let module = self
            .context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });
        GpuShader::from_wgpu(module)
    }

    fn destroy_shader(&self, shader: GpuShader) {
        // Shader modules are reclaimed when the last handle drops.
        drop(shader);
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> GpuSampler {
        let address = match desc.address {
            ember_test_utils::AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            ember_test_utils::AddressMode::Repeat => wgpu::AddressMode::Repeat,
            ember_test_utils::AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        };
        let filter = match desc.filter {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        };
        let sampler = self.context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("device_sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        GpuSampler::from_wgpu(sampler)
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuPipeline {
        profile_function!();
        let mut guard = self.lock();
        let state = &mut *guard;

        let attributes: Vec<wgpu::VertexAttribute> = desc
            .vertex_attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: map_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();

        let uniform_key = (LayoutKind::Uniforms, desc.uniform_slots);
        let texture_key = (LayoutKind::Textures, desc.texture_slots);
        ensure_layout(&self.context.device, &mut state.layouts, uniform_key);
        ensure_layout(&self.context.device, &mut state.layouts, texture_key);

        let mut group_layouts: Vec<&wgpu::BindGroupLayout> = vec![&state.layouts[&uniform_key]];
        if desc.texture_slots > 0 {
            group_layouts.push(&state.layouts[&texture_key]);
        }

        let layout = self
            .context
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });

        let blend = match desc.blend {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        };
        let write_mask = match desc.color_mask {
            ColorMask::All => wgpu::ColorWrites::ALL,
            ColorMask::ColorOnly => wgpu::ColorWrites::COLOR,
        };
        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: map_format(*format),
                    blend,
                    write_mask,
                })
            })
            .collect();

        let depth_stencil = match desc.depth {
            DepthMode::Disabled => None,
            DepthMode::Ignore => Some((false, wgpu::CompareFunction::Always)),
            DepthMode::ReadOnly => Some((false, wgpu::CompareFunction::LessEqual)),
            DepthMode::ReadWrite => Some((true, wgpu::CompareFunction::LessEqual)),
        }
        .map(|(write, compare)| wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
            depth_write_enabled: write,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self
            .context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: desc.shader.as_wgpu(),
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: desc.vertex_stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: desc.shader.as_wgpu(),
                    entry_point: Some("fs_main"),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: match desc.cull {
                        CullMode::None => None,
                        CullMode::Back => Some(wgpu::Face::Back),
                    },
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        let pipeline = GpuPipeline::from_wgpu(pipeline);
        state
            .pipeline_slots
            .insert(pipeline.id(), (desc.uniform_slots, desc.texture_slots));
        pipeline
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> GpuFramebuffer {
        let color = desc
            .color_formats
            .iter()
            .enumerate()
            .map(|(index, format)| {
                self.create_texture(
                    &TextureDesc {
                        label: &format!("{}_color{}", desc.label, index),
                        width: desc.width,
                        height: desc.height,
                        format: *format,
                        render_attachment: true,
                    },
                    None,
                )
            })
            .collect();

        let depth = desc.depth.then(|| {
            self.create_texture(
                &TextureDesc {
                    label: &format!("{}_depth", desc.label),
                    width: desc.width,
                    height: desc.height,
                    format: TextureFormat::Depth32Float,
                    render_attachment: true,
                },
                None,
            )
        });

        GpuFramebuffer::new(desc.width, desc.height, color, depth)
    }

    fn destroy_framebuffer(&self, framebuffer: GpuFramebuffer) {
        for texture in framebuffer.color_attachments() {
            texture.as_wgpu().destroy();
        }
        if let Some(depth) = framebuffer.depth_attachment() {
            depth.as_wgpu().destroy();
        }
    }

    fn configure_surface(&self, width: u32, height: u32, mode: PresentMode) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.surface.config.width = width.max(1);
        state.surface.config.height = height.max(1);
        state.surface.config.present_mode = map_present_mode(mode);
        state
            .surface
            .surface
            .configure(&self.context.device, &state.surface.config);
        tracing::debug!(width, height, ?mode, "surface configured");
    }

    fn surface_size(&self) -> (u32, u32) {
        self.lock().surface.size()
    }

    fn surface_format(&self) -> TextureFormat {
        unmap_format(self.lock().surface.format())
    }

    fn begin_frame(&self) -> DeviceResult<()> {
        profile_function!();
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.frame.is_some() {
            return Err(DeviceError::Internal("frame already begun".into()));
        }

        let surface_texture = state.surface.surface.get_current_texture().map_err(|e| {
            match e {
                wgpu::SurfaceError::Timeout => DeviceError::AcquireTimeout,
                wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost => {
                    DeviceError::SurfaceLost
                }
                wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other => {
                    DeviceError::Internal(e.to_string())
                }
            }
        })?;
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        state.frame = Some(FrameState {
            encoder: Some(encoder),
            surface_texture: Some(surface_texture),
            surface_view: Some(surface_view),
            pass: None,
        });
        Ok(())
    }

    fn begin_pass(&self, desc: &PassDesc) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(frame) = state.frame.as_mut() else {
            tracing::error!("begin_pass() outside a frame");
            return;
        };
        if frame.pass.is_some() {
            tracing::error!("begin_pass() while a pass is already open");
            return;
        }
        let Some(encoder) = frame.encoder.as_mut() else {
            return;
        };

        let color_ops = wgpu::Operations {
            load: match desc.clear_color {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            },
            store: wgpu::StoreOp::Store,
        };

        let mut color_attachments = Vec::new();
        let mut depth_view = None;
        match desc.target {
            PassTarget::Surface => {
                let view = frame
                    .surface_view
                    .as_ref()
                    .expect("surface view present while frame is open");
                color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: color_ops,
                    depth_slice: None,
                }));
            }
            PassTarget::Framebuffer(fb) => {
                for texture in fb.color_attachments() {
                    color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                        view: texture.view(),
                        resolve_target: None,
                        ops: color_ops,
                        depth_slice: None,
                    }));
                }
                depth_view = fb.depth_attachment().map(GpuTexture::view);
            }
        }

        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: match desc.clear_depth {
                        Some(depth) => wgpu::LoadOp::Clear(depth),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                occlusion_query_set: None,
                timestamp_writes: None,
            })
            .forget_lifetime();

        frame.pass = Some(PassState {
            pass,
            slots: (0, 0),
            uniforms: std::array::from_fn(|_| None),
            textures: std::array::from_fn(|_| None),
            uniforms_dirty: false,
            textures_dirty: false,
        });
    }

    fn set_pipeline(&self, pipeline: &GpuPipeline) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let slots = state
            .pipeline_slots
            .get(&pipeline.id())
            .copied()
            .unwrap_or((0, 0));
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_pipeline() outside a pass");
            return;
        };
        pass.pass.set_pipeline(pipeline.as_wgpu());
        pass.slots = slots;
        pass.uniforms_dirty = true;
        pass.textures_dirty = true;
    }

    fn set_viewport(&self, x: f32, y: f32, width: f32, height: f32) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_viewport() outside a pass");
            return;
        };
        pass.pass.set_viewport(x, y, width, height, 0.0, 1.0);
    }

    fn set_scissor(&self, x: u32, y: u32, width: u32, height: u32) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_scissor() outside a pass");
            return;
        };
        pass.pass.set_scissor_rect(x, y, width, height);
    }

    fn set_vertex_buffer(&self, buffer: &GpuBuffer) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_vertex_buffer() outside a pass");
            return;
        };
        pass.pass.set_vertex_buffer(0, buffer.as_wgpu().slice(..));
    }

    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_index_buffer() outside a pass");
            return;
        };
        let format = match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        };
        pass.pass.set_index_buffer(buffer.as_wgpu().slice(..), format);
    }

    fn set_uniform_buffer(&self, slot: u32, buffer: &GpuBuffer, offset: u64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_uniform_buffer() outside a pass");
            return;
        };
        if slot as usize >= MAX_UNIFORM_SLOTS {
            tracing::error!(slot, "uniform slot out of range");
            return;
        }
        pass.uniforms[slot as usize] = Some((buffer.clone(), offset));
        pass.uniforms_dirty = true;
    }

    fn set_texture(&self, slot: u32, texture: &GpuTexture, sampler: &GpuSampler) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(pass) = state.frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("set_texture() outside a pass");
            return;
        };
        if slot as usize >= MAX_TEXTURE_SLOTS {
            tracing::error!(slot, "texture slot out of range");
            return;
        }
        pass.textures[slot as usize] = Some((texture.clone(), sampler.clone()));
        pass.textures_dirty = true;
    }

    fn draw_indexed(&self, index_count: u32) {
        let mut guard = self.lock();
        let DeviceState {
            frame,
            layouts,
            bind_groups,
            ..
        } = &mut *guard;
        let Some(pass) = frame.as_mut().and_then(|f| f.pass.as_mut()) else {
            tracing::error!("draw_indexed() outside a pass");
            return;
        };

        let (uniform_slots, texture_slots) = pass.slots;

        if pass.uniforms_dirty {
            let mut resources = Vec::with_capacity(uniform_slots as usize);
            let mut offsets = Vec::with_capacity(uniform_slots as usize);
            for slot in 0..uniform_slots as usize {
                let Some((buffer, offset)) = &pass.uniforms[slot] else {
                    tracing::error!(slot, "draw with unbound uniform slot");
                    return;
                };
                resources.push(buffer.id());
                offsets.push(*offset as u32);
            }

            let key = BindGroupKey {
                kind: LayoutKind::Uniforms,
                resources,
            };
            let layout = ensure_layout(
                &self.context.device,
                layouts,
                (LayoutKind::Uniforms, uniform_slots),
            );
            let group = bind_groups.entry(key).or_insert_with(|| {
                let entries: Vec<wgpu::BindGroupEntry> = (0..uniform_slots as usize)
                    .map(|slot| {
                        let (buffer, _) = pass.uniforms[slot]
                            .as_ref()
                            .expect("uniform slot checked above");
                        wgpu::BindGroupEntry {
                            binding: slot as u32,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: buffer.as_wgpu(),
                                offset: 0,
                                size: NonZeroU64::new(buffer.size().min(MAX_UNIFORM_BINDING)),
                            }),
                        }
                    })
                    .collect();
                self.context
                    .device
                    .create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("uniform_slots"),
                        layout,
                        entries: &entries,
                    })
            });
            pass.pass.set_bind_group(0, &*group, &offsets);
            pass.uniforms_dirty = false;
        }

        if pass.textures_dirty && texture_slots > 0 {
            let mut resources = Vec::with_capacity(texture_slots as usize * 2);
            for slot in 0..texture_slots as usize {
                let Some((texture, sampler)) = &pass.textures[slot] else {
                    tracing::error!(slot, "draw with unbound texture slot");
                    return;
                };
                resources.push(texture.id());
                resources.push(sampler.id());
            }

            let key = BindGroupKey {
                kind: LayoutKind::Textures,
                resources,
            };
            let layout = ensure_layout(
                &self.context.device,
                layouts,
                (LayoutKind::Textures, texture_slots),
            );
            let group = bind_groups.entry(key).or_insert_with(|| {
                let mut entries = Vec::with_capacity(texture_slots as usize * 2);
                for slot in 0..texture_slots as usize {
                    let (texture, sampler) = pass.textures[slot]
                        .as_ref()
                        .expect("texture slot checked above");
                    entries.push(wgpu::BindGroupEntry {
                        binding: slot as u32 * 2,
                        resource: wgpu::BindingResource::TextureView(texture.view()),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: slot as u32 * 2 + 1,
                        resource: wgpu::BindingResource::Sampler(sampler.as_wgpu()),
                    });
                }
                self.context
                    .device
                    .create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("texture_slots"),
                        layout,
                        entries: &entries,
                    })
            });
            pass.pass.set_bind_group(1, &*group, &[]);
            pass.textures_dirty = false;
        }

        pass.pass.draw_indexed(0..index_count, 0, 0..1);
    }

    fn end_pass(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(frame) = state.frame.as_mut() else {
            tracing::error!("end_pass() outside a frame");
            return;
        };
        if frame.pass.take().is_none() {
            tracing::error!("end_pass() with no open pass");
        }
    }

    fn end_frame(&self) {
        profile_function!();
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(mut frame) = state.frame.take() else {
            tracing::error!("end_frame() outside a frame");
            return;
        };
        if frame.pass.take().is_some() {
            tracing::error!("end_frame() with a pass still open");
        }
        drop(frame.surface_view.take());

        if let Some(encoder) = frame.encoder.take() {
            self.context.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(surface_texture) = frame.surface_texture.take() {
            surface_texture.present();
        }
    }
}
