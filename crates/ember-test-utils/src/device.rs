//! The graphics device abstraction the rendering core is written against.
//!
//! [`GraphicsDevice`] exposes exactly the operations the core needs: buffer
//! and texture creation, shader compilation, pipeline-state objects,
//! framebuffers, pass recording with slot-indexed resource binding, indexed
//! draws, and presentation. Implementations exist for wgpu (in
//! `ember-render`) and for a call-recording mock (behind the `mock` feature),
//! so every batching and lifetime invariant can be verified without a GPU.
//!
//! The trait takes `&self` and returns owned handles, which keeps it
//! object-safe; frame recording state lives behind interior mutability in
//! the implementations.

use std::fmt;

use crate::gpu_types::*;

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// Descriptor for buffer creation.
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub kind: BufferKind,
}

/// Texture formats used by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    /// Size of one texel in bytes.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    /// Whether this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

/// Descriptor for texture creation.
#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Whether the texture can be used as a render-pass attachment.
    pub render_attachment: bool,
}

/// Descriptor for shader compilation from WGSL source.
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// Texture addressing mode, applied to both U and V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Descriptor for sampler creation. Hashable so samplers can be deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address: AddressMode,
}

/// Per-attribute vertex format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One attribute of a vertex input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u64,
    pub location: u32,
}

/// Color blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Source replaces destination.
    Opaque,
    /// Standard source-alpha blending.
    Alpha,
}

/// Color channel write mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMask {
    All,
    /// RGB only; destination alpha is preserved.
    ColorOnly,
}

/// Depth attachment interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    /// The target pass has no depth attachment.
    Disabled,
    /// Depth attachment present but neither tested nor written (2D overlay).
    Ignore,
    /// Test against depth without writing (translucent geometry).
    ReadOnly,
    /// Test and write (opaque geometry).
    ReadWrite,
}

/// Triangle face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

/// Descriptor for a pipeline-state object: shader, vertex input layout, and
/// all fixed-function state rolled together. Triangle-list topology is
/// implied; the core draws indexed triangles exclusively.
#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub shader: &'a GpuShader,
    pub vertex_stride: u64,
    pub vertex_attributes: &'a [VertexAttribute],
    /// Number of uniform-buffer slots the shader declares (group 0).
    pub uniform_slots: u32,
    /// Number of texture+sampler slot pairs the shader declares (group 1).
    pub texture_slots: u32,
    pub blend: BlendMode,
    pub color_mask: ColorMask,
    pub depth: DepthMode,
    pub cull: CullMode,
    pub color_formats: &'a [TextureFormat],
}

/// Descriptor for framebuffer creation.
#[derive(Debug, Clone)]
pub struct FramebufferDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub color_formats: &'a [TextureFormat],
    pub depth: bool,
}

/// Where a render pass draws.
#[derive(Debug, Clone, Copy)]
pub enum PassTarget<'a> {
    /// The presented swapchain surface.
    Surface,
    /// An off-screen framebuffer.
    Framebuffer(&'a GpuFramebuffer),
}

/// Descriptor for beginning a render pass.
#[derive(Debug, Clone)]
pub struct PassDesc<'a> {
    pub label: &'a str,
    pub target: PassTarget<'a>,
    /// Clear all color attachments to this value, or load existing contents.
    pub clear_color: Option<[f32; 4]>,
    /// Clear the depth attachment to this value, or load existing contents.
    pub clear_depth: Option<f32>,
}

/// Index element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Presentation synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentMode {
    /// One vsync interval per present (FIFO).
    Vsync,
    /// Present immediately, tearing permitted.
    Immediate,
}

/// Errors surfaced by a graphics device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The surface was lost or is outdated; reconfigure and retry next frame.
    SurfaceLost,
    /// Acquiring the next surface texture timed out.
    AcquireTimeout,
    /// Unrecoverable device-side failure.
    Internal(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::SurfaceLost => write!(f, "presentation surface lost or outdated"),
            DeviceError::AcquireTimeout => write!(f, "timed out acquiring surface texture"),
            DeviceError::Internal(msg) => write!(f, "device error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Trait abstracting GPU resource creation, pass recording, and presentation.
///
/// Ordering contract: all methods are called from one rendering thread.
/// Between `begin_frame` and `end_frame` at most one pass is open at a time;
/// binding methods and `draw_indexed` require an open pass. Destroy methods
/// take the handle by value; disposal is single-owner and happens once.
pub trait GraphicsDevice: Send + Sync {
    // Resources

    /// Create a GPU buffer.
    fn create_buffer(&self, desc: &BufferDesc) -> GpuBuffer;

    /// Write a byte range into a buffer.
    ///
    /// Implementations should prefer a mapped staging write over a full
    /// buffer update; only the given range is transferred.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Destroy a buffer.
    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Create a texture, optionally uploading initial pixel data
    /// (tightly packed, `width * height * bytes_per_pixel` bytes).
    fn create_texture(&self, desc: &TextureDesc, pixels: Option<&[u8]>) -> GpuTexture;

    /// Destroy a texture.
    fn destroy_texture(&self, texture: GpuTexture);

    /// Compile a shader module from source.
    fn create_shader(&self, desc: &ShaderDesc) -> GpuShader;

    /// Destroy a compiled shader.
    fn destroy_shader(&self, shader: GpuShader);

    /// Create a texture sampler.
    fn create_sampler(&self, desc: &SamplerDesc) -> GpuSampler;

    /// Create a pipeline-state object.
    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuPipeline;

    /// Create a framebuffer with its attachment textures.
    fn create_framebuffer(&self, desc: &FramebufferDesc) -> GpuFramebuffer;

    /// Destroy a framebuffer and its attachments.
    fn destroy_framebuffer(&self, framebuffer: GpuFramebuffer);

    // Presentation surface

    /// Resize/reconfigure the presentation surface.
    fn configure_surface(&self, width: u32, height: u32, mode: PresentMode);

    /// Current surface size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Color format of the presentation surface.
    fn surface_format(&self) -> TextureFormat;

    // Frame recording

    /// Begin a frame: acquire the next surface texture and open a command
    /// encoder.
    fn begin_frame(&self) -> DeviceResult<()>;

    /// Begin a render pass.
    fn begin_pass(&self, desc: &PassDesc);

    /// Bind a pipeline-state object.
    fn set_pipeline(&self, pipeline: &GpuPipeline);

    /// Set the viewport in pixels.
    fn set_viewport(&self, x: f32, y: f32, width: f32, height: f32);

    /// Set the scissor rectangle in pixels.
    fn set_scissor(&self, x: u32, y: u32, width: u32, height: u32);

    /// Bind the vertex buffer.
    fn set_vertex_buffer(&self, buffer: &GpuBuffer);

    /// Bind the index buffer.
    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat);

    /// Bind a uniform buffer at a fixed slot with a byte offset into it.
    fn set_uniform_buffer(&self, slot: u32, buffer: &GpuBuffer, offset: u64);

    /// Bind a texture and sampler pair at a fixed slot.
    fn set_texture(&self, slot: u32, texture: &GpuTexture, sampler: &GpuSampler);

    /// Issue one indexed draw covering `index_count` indices.
    fn draw_indexed(&self, index_count: u32);

    /// End the current render pass.
    fn end_pass(&self);

    /// Submit the frame's commands and present the surface texture.
    fn end_frame(&self);
}
