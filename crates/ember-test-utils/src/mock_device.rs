//! Mock implementation of [`GraphicsDevice`] for testing.
//!
//! Records every operation as a [`DeviceCall`] without touching the GPU, so
//! tests can assert on flush counts, draw-call index counts, bind order, and
//! resource lifetime (create/destroy pairing).

use parking_lot::Mutex;

use crate::device::*;
use crate::gpu_types::*;

/// One recorded GPU operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { id: u64, size: u64, kind: BufferKind },
    WriteBuffer { id: u64, offset: u64, size: usize },
    DestroyBuffer { id: u64 },
    CreateTexture { id: u64, width: u32, height: u32, format: TextureFormat },
    DestroyTexture { id: u64 },
    CreateShader { id: u64, label: String },
    DestroyShader { id: u64 },
    CreateSampler { id: u64 },
    CreatePipeline { id: u64, label: String },
    CreateFramebuffer { id: u64, width: u32, height: u32, colors: usize, depth: bool },
    DestroyFramebuffer { id: u64 },
    ConfigureSurface { width: u32, height: u32, mode: PresentMode },
    BeginFrame,
    BeginPass { framebuffer: Option<u64>, clear_color: bool, clear_depth: bool },
    SetPipeline { id: u64 },
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    SetScissor { x: u32, y: u32, width: u32, height: u32 },
    SetVertexBuffer { id: u64 },
    SetIndexBuffer { id: u64, format: IndexFormat },
    SetUniformBuffer { slot: u32, id: u64, offset: u64 },
    SetTexture { slot: u32, id: u64 },
    DrawIndexed { index_count: u32 },
    EndPass,
    EndFrame,
}

/// Call-recording mock device.
///
/// # Example
///
/// ```
/// # #[cfg(feature = "mock")]
/// # {
/// use ember_test_utils::{BufferDesc, BufferKind, GraphicsDevice, MockDevice};
///
/// let device = MockDevice::new();
/// let buffer = device.create_buffer(&BufferDesc {
///     label: "test",
///     size: 1024,
///     kind: BufferKind::Vertex,
/// });
/// device.write_buffer(&buffer, 0, &[0u8; 64]);
///
/// assert!(buffer.is_mock());
/// assert_eq!(device.count_buffer_writes(), 1);
/// # }
/// ```
pub struct MockDevice {
    calls: Mutex<Vec<DeviceCall>>,
    surface: Mutex<(u32, u32, PresentMode)>,
    surface_format: TextureFormat,
}

impl MockDevice {
    /// Create a mock device with a 1280x720 surface.
    pub fn new() -> Self {
        Self::with_surface_size(1280, 720)
    }

    /// Create a mock device with the given surface size.
    pub fn with_surface_size(width: u32, height: u32) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            surface: Mutex::new((width, height, PresentMode::Vsync)),
            surface_format: TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }

    /// A copy of all recorded calls.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn count_matching(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Number of indexed draw calls issued.
    pub fn count_draw_calls(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::DrawIndexed { .. }))
    }

    /// Index counts of every draw call, in submission order.
    pub fn draw_index_counts(&self) -> Vec<u32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    /// `(slot, texture id)` of every texture bind, in submission order.
    pub fn texture_binds(&self) -> Vec<(u32, u64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetTexture { slot, id } => Some((*slot, *id)),
                _ => None,
            })
            .collect()
    }

    /// `(buffer id, offset, size)` of every buffer write, in order.
    pub fn buffer_writes(&self) -> Vec<(u64, u64, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::WriteBuffer { id, offset, size } => Some((*id, *offset, *size)),
                _ => None,
            })
            .collect()
    }

    /// Number of buffer writes.
    pub fn count_buffer_writes(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::WriteBuffer { .. }))
    }

    /// Number of render passes begun.
    pub fn count_passes(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::BeginPass { .. }))
    }

    /// Number of texture creations.
    pub fn count_texture_creates(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::CreateTexture { .. }))
    }

    /// Number of shader compilations.
    pub fn count_shader_creates(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::CreateShader { .. }))
    }

    /// Number of shader destructions.
    pub fn count_shader_destroys(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::DestroyShader { .. }))
    }

    /// Number of framebuffer creations.
    pub fn count_framebuffer_creates(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::CreateFramebuffer { .. }))
    }

    /// Number of framebuffer destructions.
    pub fn count_framebuffer_destroys(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::DestroyFramebuffer { .. }))
    }

    /// Number of buffer destructions.
    pub fn count_buffer_destroys(&self) -> usize {
        self.count_matching(|c| matches!(c, DeviceCall::DestroyBuffer { .. }))
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDevice for MockDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> GpuBuffer {
        let buffer = GpuBuffer::mock(desc.size);
        self.record(DeviceCall::CreateBuffer {
            id: buffer.id(),
            size: desc.size,
            kind: desc.kind,
        });
        buffer
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        self.record(DeviceCall::WriteBuffer {
            id: buffer.id(),
            offset,
            size: data.len(),
        });
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        self.record(DeviceCall::DestroyBuffer { id: buffer.id() });
    }

    fn create_texture(&self, desc: &TextureDesc, _pixels: Option<&[u8]>) -> GpuTexture {
        let texture = GpuTexture::mock();
        self.record(DeviceCall::CreateTexture {
            id: texture.id(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        texture
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        self.record(DeviceCall::DestroyTexture { id: texture.id() });
    }

    fn create_shader(&self, desc: &ShaderDesc) -> GpuShader {
        let shader = GpuShader::mock();
        self.record(DeviceCall::CreateShader {
            id: shader.id(),
            label: desc.label.to_string(),
        });
        shader
    }

    fn destroy_shader(&self, shader: GpuShader) {
        self.record(DeviceCall::DestroyShader { id: shader.id() });
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> GpuSampler {
        let sampler = GpuSampler::mock();
        self.record(DeviceCall::CreateSampler { id: sampler.id() });
        sampler
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> GpuPipeline {
        let pipeline = GpuPipeline::mock();
        self.record(DeviceCall::CreatePipeline {
            id: pipeline.id(),
            label: desc.label.to_string(),
        });
        pipeline
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> GpuFramebuffer {
        let color = desc
            .color_formats
            .iter()
            .map(|_| GpuTexture::mock())
            .collect::<Vec<_>>();
        let depth = desc.depth.then(GpuTexture::mock);
        let framebuffer = GpuFramebuffer::new(desc.width, desc.height, color, depth);
        self.record(DeviceCall::CreateFramebuffer {
            id: framebuffer.id(),
            width: desc.width,
            height: desc.height,
            colors: desc.color_formats.len(),
            depth: desc.depth,
        });
        framebuffer
    }

    fn destroy_framebuffer(&self, framebuffer: GpuFramebuffer) {
        self.record(DeviceCall::DestroyFramebuffer {
            id: framebuffer.id(),
        });
    }

    fn configure_surface(&self, width: u32, height: u32, mode: PresentMode) {
        *self.surface.lock() = (width, height, mode);
        self.record(DeviceCall::ConfigureSurface {
            width,
            height,
            mode,
        });
    }

    fn surface_size(&self) -> (u32, u32) {
        let (w, h, _) = *self.surface.lock();
        (w, h)
    }

    fn surface_format(&self) -> TextureFormat {
        self.surface_format
    }

    fn begin_frame(&self) -> DeviceResult<()> {
        self.record(DeviceCall::BeginFrame);
        Ok(())
    }

    fn begin_pass(&self, desc: &PassDesc) {
        let framebuffer = match desc.target {
            PassTarget::Surface => None,
            PassTarget::Framebuffer(fb) => Some(fb.id()),
        };
        self.record(DeviceCall::BeginPass {
            framebuffer,
            clear_color: desc.clear_color.is_some(),
            clear_depth: desc.clear_depth.is_some(),
        });
    }

    fn set_pipeline(&self, pipeline: &GpuPipeline) {
        self.record(DeviceCall::SetPipeline { id: pipeline.id() });
    }

    fn set_viewport(&self, x: f32, y: f32, width: f32, height: f32) {
        self.record(DeviceCall::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn set_scissor(&self, x: u32, y: u32, width: u32, height: u32) {
        self.record(DeviceCall::SetScissor {
            x,
            y,
            width,
            height,
        });
    }

    fn set_vertex_buffer(&self, buffer: &GpuBuffer) {
        self.record(DeviceCall::SetVertexBuffer { id: buffer.id() });
    }

    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat) {
        self.record(DeviceCall::SetIndexBuffer {
            id: buffer.id(),
            format,
        });
    }

    fn set_uniform_buffer(&self, slot: u32, buffer: &GpuBuffer, offset: u64) {
        self.record(DeviceCall::SetUniformBuffer {
            slot,
            id: buffer.id(),
            offset,
        });
    }

    fn set_texture(&self, slot: u32, texture: &GpuTexture, _sampler: &GpuSampler) {
        self.record(DeviceCall::SetTexture {
            slot,
            id: texture.id(),
        });
    }

    fn draw_indexed(&self, index_count: u32) {
        self.record(DeviceCall::DrawIndexed { index_count });
    }

    fn end_pass(&self) {
        self.record(DeviceCall::EndPass);
    }

    fn end_frame(&self) {
        self.record(DeviceCall::EndFrame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_buffer_lifecycle() {
        let device = MockDevice::new();

        let buffer = device.create_buffer(&BufferDesc {
            label: "test",
            size: 1024,
            kind: BufferKind::Vertex,
        });
        device.write_buffer(&buffer, 64, &[0u8; 128]);
        let id = buffer.id();
        device.destroy_buffer(buffer);

        let calls = device.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            DeviceCall::WriteBuffer {
                id,
                offset: 64,
                size: 128
            }
        );
        assert_eq!(device.count_buffer_destroys(), 1);
    }

    #[test]
    fn records_draws_in_order() {
        let device = MockDevice::new();
        device.draw_indexed(6);
        device.draw_indexed(12);
        assert_eq!(device.draw_index_counts(), vec![6, 12]);
    }

    #[test]
    fn configure_surface_updates_reported_size() {
        let device = MockDevice::new();
        device.configure_surface(640, 480, PresentMode::Immediate);
        assert_eq!(device.surface_size(), (640, 480));
    }
}
