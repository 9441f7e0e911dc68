//! 2D textures created from raw pixel payloads.
//!
//! Decoding is an asset-import concern outside this core; callers hand over
//! width, height, format, and tightly packed bytes, and get back an owned
//! texture handle usable by the sprite batcher and material system.

use std::fmt;

use ember_test_utils::{GpuTexture, GraphicsDevice, TextureDesc, TextureFormat};

/// A raw pixel payload as produced by the asset importer.
#[derive(Debug, Clone, Copy)]
pub struct PixelData<'a> {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Tightly packed rows, `width * height * bytes_per_pixel` bytes.
    pub bytes: &'a [u8],
}

/// Errors raised when creating textures from raw payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// The byte payload does not match `width * height * bytes_per_pixel`.
    SizeMismatch { expected: usize, actual: usize },
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::SizeMismatch { expected, actual } => {
                write!(
                    f,
                    "pixel payload size mismatch: expected {} bytes, got {}",
                    expected, actual
                )
            }
        }
    }
}

impl std::error::Error for TextureError {}

/// An owned 2D texture with its dimensions and format.
///
/// Cloning is cheap and shares the underlying GPU texture; the clone that
/// calls [`Texture2D::destroy`] releases it for all.
#[derive(Debug, Clone)]
pub struct Texture2D {
    gpu: GpuTexture,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl Texture2D {
    /// Upload a raw pixel payload into a new texture.
    pub fn from_pixels(
        device: &dyn GraphicsDevice,
        label: &str,
        pixels: &PixelData,
    ) -> Result<Self, TextureError> {
        let expected = (pixels.width * pixels.height * pixels.format.bytes_per_pixel()) as usize;
        if pixels.bytes.len() != expected {
            return Err(TextureError::SizeMismatch {
                expected,
                actual: pixels.bytes.len(),
            });
        }

        let gpu = device.create_texture(
            &TextureDesc {
                label,
                width: pixels.width,
                height: pixels.height,
                format: pixels.format,
                render_attachment: false,
            },
            Some(pixels.bytes),
        );

        tracing::debug!(
            label,
            width = pixels.width,
            height = pixels.height,
            "created texture"
        );

        Ok(Self {
            gpu,
            width: pixels.width,
            height: pixels.height,
            format: pixels.format,
        })
    }

    /// Wrap an existing GPU texture (e.g. a render-target attachment).
    pub fn from_gpu(gpu: GpuTexture, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            gpu,
            width,
            height,
            format,
        }
    }

    /// The reserved 1x1 magenta placeholder substituted for missing assets.
    pub fn placeholder(device: &dyn GraphicsDevice) -> Self {
        Self::solid(device, "placeholder", [255, 0, 255, 255])
    }

    /// A 1x1 opaque white texture, useful as a neutral material binding.
    pub fn white(device: &dyn GraphicsDevice) -> Self {
        Self::solid(device, "white", [255, 255, 255, 255])
    }

    fn solid(device: &dyn GraphicsDevice, label: &str, rgba: [u8; 4]) -> Self {
        let pixels = PixelData {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            bytes: &rgba,
        };
        Self::from_pixels(device, label, &pixels).expect("1x1 payload is always well-sized")
    }

    /// Process-unique id of the underlying GPU texture.
    pub fn id(&self) -> u64 {
        self.gpu.id()
    }

    /// The underlying GPU texture handle.
    pub fn gpu(&self) -> &GpuTexture {
        &self.gpu
    }

    /// Texture width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Texture height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texture size as (width, height).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel format.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Release the GPU texture.
    pub fn destroy(self, device: &dyn GraphicsDevice) {
        device.destroy_texture(self.gpu);
    }
}
