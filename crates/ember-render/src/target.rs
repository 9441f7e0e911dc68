//! Off-screen render targets.

use ember_test_utils::{FramebufferDesc, GpuFramebuffer, GpuTexture, GraphicsDevice, TextureFormat};

/// Color format of the pipeline's main off-screen target.
pub const MAIN_TARGET_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;

/// Descriptor for creating a render target.
#[derive(Debug, Clone)]
pub struct RenderTargetDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub color_formats: &'a [TextureFormat],
    pub depth: bool,
}

/// An off-screen target: one or more color attachments, an optional
/// depth attachment, and the framebuffer binding them.
///
/// Resizing destroys and recreates the attachments; the handle itself stays
/// stable so owners never hold a dangling target.
#[derive(Debug)]
pub struct RenderTarget {
    framebuffer: Option<GpuFramebuffer>,
    width: u32,
    height: u32,
    color_formats: Vec<TextureFormat>,
    has_depth: bool,
    label: String,
}

impl RenderTarget {
    /// Create a render target and its attachments.
    pub fn new(device: &dyn GraphicsDevice, desc: &RenderTargetDesc) -> Self {
        let framebuffer = device.create_framebuffer(&FramebufferDesc {
            label: desc.label,
            width: desc.width,
            height: desc.height,
            color_formats: desc.color_formats,
            depth: desc.depth,
        });

        tracing::debug!(
            label = desc.label,
            width = desc.width,
            height = desc.height,
            "created render target"
        );

        Self {
            framebuffer: Some(framebuffer),
            width: desc.width,
            height: desc.height,
            color_formats: desc.color_formats.to_vec(),
            has_depth: desc.depth,
            label: desc.label.to_string(),
        }
    }

    /// The framebuffer to bind for rendering.
    ///
    /// # Panics
    /// Panics if the target has been destroyed; a destroyed target must not
    /// be drawn into.
    pub fn framebuffer(&self) -> &GpuFramebuffer {
        self.framebuffer
            .as_ref()
            .expect("render target already destroyed")
    }

    /// The first color attachment (the composited output).
    pub fn color_texture(&self) -> &GpuTexture {
        &self.framebuffer().color_attachments()[0]
    }

    /// Color attachment by index.
    pub fn color_attachment(&self, index: usize) -> Option<&GpuTexture> {
        self.framebuffer().color_attachment(index)
    }

    /// Target width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Target size as (width, height).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Format of the first color attachment.
    pub fn format(&self) -> TextureFormat {
        self.color_formats[0]
    }

    /// Destroy the attachments and recreate them at the new size.
    ///
    /// No-op when the size is unchanged; otherwise exactly one
    /// destroy+recreate.
    pub fn resize(&mut self, device: &dyn GraphicsDevice, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }

        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
        self.framebuffer = Some(device.create_framebuffer(&FramebufferDesc {
            label: &self.label,
            width,
            height,
            color_formats: &self.color_formats,
            depth: self.has_depth,
        }));
        self.width = width;
        self.height = height;

        tracing::debug!(label = %self.label, width, height, "resized render target");
    }

    /// Release the framebuffer and attachments. Idempotent.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(framebuffer) = self.framebuffer.take() {
            device.destroy_framebuffer(framebuffer);
        }
    }
}
