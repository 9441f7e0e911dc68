//! GPU resource handles that can be real or mock.
//!
//! Every handle carries a process-unique id assigned at creation. The id
//! doubles as the key for caches that need to compare resources (bind-group
//! reuse, batch-break detection) and as the identity recorded by the mock
//! device in tests.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a GPU buffer (vertex, index, or uniform).
#[derive(Clone, Debug)]
pub struct GpuBuffer {
    id: u64,
    inner: GpuBufferInner,
}

#[derive(Clone, Debug)]
enum GpuBufferInner {
    Real(wgpu::Buffer),
    #[cfg(feature = "mock")]
    Mock { size: u64 },
}

impl GpuBuffer {
    /// Wrap a real wgpu buffer.
    pub fn from_wgpu(buffer: wgpu::Buffer) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuBufferInner::Real(buffer),
        }
    }

    /// Create a mock buffer (for testing).
    #[cfg(feature = "mock")]
    pub fn mock(size: u64) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuBufferInner::Mock { size },
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> u64 {
        match &self.inner {
            GpuBufferInner::Real(buffer) => buffer.size(),
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { size } => *size,
        }
    }

    /// Get the underlying wgpu buffer.
    ///
    /// # Panics
    /// Panics if this is a mock handle (test-only code path).
    pub fn as_wgpu(&self) -> &wgpu::Buffer {
        match &self.inner {
            GpuBufferInner::Real(buffer) => buffer,
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { .. } => {
                panic!("Attempted to get wgpu::Buffer from mock buffer")
            }
        }
    }

    /// Check whether this is a mock handle.
    #[cfg(feature = "mock")]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner, GpuBufferInner::Mock { .. })
    }
}

/// Handle to a GPU texture together with its default view.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    id: u64,
    inner: GpuTextureInner,
}

#[derive(Clone, Debug)]
enum GpuTextureInner {
    Real {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    #[cfg(feature = "mock")]
    Mock,
}

impl GpuTexture {
    /// Wrap a real wgpu texture and its view.
    pub fn from_wgpu(texture: wgpu::Texture, view: wgpu::TextureView) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuTextureInner::Real { texture, view },
        }
    }

    /// Create a mock texture (for testing).
    #[cfg(feature = "mock")]
    pub fn mock() -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuTextureInner::Mock,
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the underlying wgpu texture.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn as_wgpu(&self) -> &wgpu::Texture {
        match &self.inner {
            GpuTextureInner::Real { texture, .. } => texture,
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock => panic!("Attempted to get wgpu::Texture from mock texture"),
        }
    }

    /// Get the texture's default view.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn view(&self) -> &wgpu::TextureView {
        match &self.inner {
            GpuTextureInner::Real { view, .. } => view,
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock => panic!("Attempted to get wgpu::TextureView from mock texture"),
        }
    }

    /// Check whether this is a mock handle.
    #[cfg(feature = "mock")]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner, GpuTextureInner::Mock)
    }
}

/// Handle to a compiled shader module.
#[derive(Clone, Debug)]
pub struct GpuShader {
    id: u64,
    inner: GpuShaderInner,
}

#[derive(Clone, Debug)]
enum GpuShaderInner {
    Real(wgpu::ShaderModule),
    #[cfg(feature = "mock")]
    Mock,
}

impl GpuShader {
    /// Wrap a real wgpu shader module.
    pub fn from_wgpu(module: wgpu::ShaderModule) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuShaderInner::Real(module),
        }
    }

    /// Create a mock shader (for testing).
    #[cfg(feature = "mock")]
    pub fn mock() -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuShaderInner::Mock,
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the underlying wgpu shader module.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn as_wgpu(&self) -> &wgpu::ShaderModule {
        match &self.inner {
            GpuShaderInner::Real(module) => module,
            #[cfg(feature = "mock")]
            GpuShaderInner::Mock => panic!("Attempted to get wgpu::ShaderModule from mock shader"),
        }
    }

    /// Check whether this is a mock handle.
    #[cfg(feature = "mock")]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner, GpuShaderInner::Mock)
    }
}

/// Handle to a texture sampler.
#[derive(Clone, Debug)]
pub struct GpuSampler {
    id: u64,
    inner: GpuSamplerInner,
}

#[derive(Clone, Debug)]
enum GpuSamplerInner {
    Real(wgpu::Sampler),
    #[cfg(feature = "mock")]
    Mock,
}

impl GpuSampler {
    /// Wrap a real wgpu sampler.
    pub fn from_wgpu(sampler: wgpu::Sampler) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuSamplerInner::Real(sampler),
        }
    }

    /// Create a mock sampler (for testing).
    #[cfg(feature = "mock")]
    pub fn mock() -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuSamplerInner::Mock,
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the underlying wgpu sampler.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn as_wgpu(&self) -> &wgpu::Sampler {
        match &self.inner {
            GpuSamplerInner::Real(sampler) => sampler,
            #[cfg(feature = "mock")]
            GpuSamplerInner::Mock => panic!("Attempted to get wgpu::Sampler from mock sampler"),
        }
    }
}

/// Handle to a render pipeline (shader + input layout + fixed-function state).
#[derive(Clone, Debug)]
pub struct GpuPipeline {
    id: u64,
    inner: GpuPipelineInner,
}

#[derive(Clone, Debug)]
enum GpuPipelineInner {
    Real(wgpu::RenderPipeline),
    #[cfg(feature = "mock")]
    Mock,
}

impl GpuPipeline {
    /// Wrap a real wgpu render pipeline.
    pub fn from_wgpu(pipeline: wgpu::RenderPipeline) -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuPipelineInner::Real(pipeline),
        }
    }

    /// Create a mock pipeline (for testing).
    #[cfg(feature = "mock")]
    pub fn mock() -> Self {
        Self {
            id: next_handle_id(),
            inner: GpuPipelineInner::Mock,
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the underlying wgpu render pipeline.
    ///
    /// # Panics
    /// Panics if this is a mock handle.
    pub fn as_wgpu(&self) -> &wgpu::RenderPipeline {
        match &self.inner {
            GpuPipelineInner::Real(pipeline) => pipeline,
            #[cfg(feature = "mock")]
            GpuPipelineInner::Mock => {
                panic!("Attempted to get wgpu::RenderPipeline from mock pipeline")
            }
        }
    }
}

/// Handle to a framebuffer: one or more color attachments plus an optional
/// depth attachment, all renderable in a single pass.
///
/// The attachments are plain [`GpuTexture`] handles, so a framebuffer's color
/// output can later be bound as a shader input (main-target composition,
/// G-buffer resolve).
#[derive(Clone, Debug)]
pub struct GpuFramebuffer {
    id: u64,
    width: u32,
    height: u32,
    color: Vec<GpuTexture>,
    depth: Option<GpuTexture>,
}

impl GpuFramebuffer {
    /// Assemble a framebuffer from already-created attachment textures.
    pub fn new(width: u32, height: u32, color: Vec<GpuTexture>, depth: Option<GpuTexture>) -> Self {
        Self {
            id: next_handle_id(),
            width,
            height,
            color,
            depth,
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Framebuffer width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Framebuffer height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// All color attachments in declaration order.
    pub fn color_attachments(&self) -> &[GpuTexture] {
        &self.color
    }

    /// A single color attachment by index.
    pub fn color_attachment(&self, index: usize) -> Option<&GpuTexture> {
        self.color.get(index)
    }

    /// The depth attachment, if present.
    pub fn depth_attachment(&self) -> Option<&GpuTexture> {
        self.depth.as_ref()
    }
}
