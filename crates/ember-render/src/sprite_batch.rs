//! Sprite batch renderer.
//!
//! Accumulates per-sprite vertex/index data into CPU-side arrays and flushes
//! one indexed draw call per contiguous run sharing the same texture. Runs
//! break implicitly on texture change and on capacity; exceeding capacity is
//! never an error. Calling `draw`/`end` outside an open session is a
//! contract violation surfaced as [`BatchError`].

use std::fmt;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use ember_core::profiling::profile_function;
use glam::{Mat4, Vec2};
use static_assertions::const_assert;
use static_assertions::const_assert_eq;

use ember_test_utils::{
    BlendMode, BufferDesc, BufferKind, ColorMask, CullMode, DepthMode, GpuBuffer, GpuPipeline,
    GpuSampler, GraphicsDevice, IndexFormat, PassDesc, PassTarget, PipelineDesc, TextureFormat,
    VertexAttribute, VertexFormat,
};

use crate::color::Color;
use crate::effect::{EffectCache, EffectDesc, EffectRef};
use crate::sampler_cache::SamplerCache;
use crate::texture::Texture2D;

/// Maximum number of sprites buffered between flushes.
pub const MAX_SPRITES: usize = 16384;

const VERTICES_PER_SPRITE: usize = 4;
const INDICES_PER_SPRITE: usize = 6;

// 16384 sprites x 4 vertices exactly fills the u16 index range.
const_assert!(MAX_SPRITES * VERTICES_PER_SPRITE <= u16::MAX as usize + 1);

/// Transient per-sprite vertex: position, texcoord, tint.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

/// Byte stride of one sprite vertex.
pub const SPRITE_VERTEX_STRIDE: u64 = 32;
const_assert_eq!(std::mem::size_of::<SpriteVertex>(), SPRITE_VERTEX_STRIDE as usize);

/// Input layout matching [`SpriteVertex`].
pub const SPRITE_VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
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
    VertexAttribute {
        format: VertexFormat::Float32x4,
        offset: 16,
        location: 2,
    },
];

bitflags! {
    /// Axis flips applied to a sprite's source rectangle, expressed purely
    /// in UV coordinates so they stay correct under both clamped and
    /// repeating samplers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpriteFlip: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
    }
}

/// A sub-rectangle of a texture in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Parameters for one sprite draw.
#[derive(Debug, Clone, Copy)]
pub struct SpriteDesc {
    /// Top-left position before rotation, in target pixels.
    pub position: Vec2,
    /// Source sub-rectangle in texture pixels; the whole texture if `None`.
    pub source: Option<Rect>,
    pub tint: Color,
    /// Rotation around `origin`, radians, clockwise.
    pub rotation: f32,
    /// Rotation/scale origin in source-rectangle pixels.
    pub origin: Vec2,
    pub scale: Vec2,
    pub flip: SpriteFlip,
}

impl Default for SpriteDesc {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            source: None,
            tint: Color::WHITE,
            rotation: 0.0,
            origin: Vec2::ZERO,
            scale: Vec2::ONE,
            flip: SpriteFlip::empty(),
        }
    }
}

/// Blend state a batch session renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchBlend {
    /// Standard alpha blending for sprites and overlays.
    #[default]
    Alpha,
    /// Opaque, color-channels-only writes; used for compositing the main
    /// target onto the presented surface without alpha artifacts.
    Composite,
}

/// Options for [`SpriteBatch::begin`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// World/view transform combined into the projection; identity if `None`.
    pub transform: Option<Mat4>,
    /// Projection matrix; a top-left-origin orthographic projection sized to
    /// the pass target if `None`.
    pub projection: Option<Mat4>,
    pub blend: BatchBlend,
    /// Clear the target's color before drawing.
    pub clear: Option<Color>,
}

/// Session and batching contract violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// `begin` called while a session is already open.
    SessionAlreadyOpen,
    /// `draw` or `end` called with no open session.
    SessionNotOpen,
    /// `draw` called without a texture and missing-asset tolerance disabled.
    MissingTexture,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::SessionAlreadyOpen => write!(f, "sprite batch session already open"),
            BatchError::SessionNotOpen => write!(f, "sprite batch session not open"),
            BatchError::MissingTexture => write!(f, "sprite drawn with no texture"),
        }
    }
}

impl std::error::Error for BatchError {}

/// Result type alias for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// Per-session statistics, readable after `end`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    /// Sprites recorded this session.
    pub sprites: usize,
    /// Flushes performed; equals the number of draw calls issued.
    pub flushes: usize,
}

/// Construction parameters for [`SpriteBatch`].
#[derive(Debug, Clone, Copy)]
pub struct SpriteBatchDesc {
    /// Color format of the off-screen target alpha sessions draw into.
    pub target_format: TextureFormat,
    /// Color format of the presented surface composite sessions draw into.
    pub surface_format: TextureFormat,
    /// Substitute the reserved placeholder for missing textures instead of
    /// failing.
    pub tolerate_missing: bool,
}

struct Session {
    pipeline: GpuPipeline,
}

/// Batches textured quads into shared buffers, one draw call per
/// same-texture run.
pub struct SpriteBatch {
    vertices: Vec<SpriteVertex>,
    indices: Vec<u16>,
    /// Sprites written since the last flush.
    pending: usize,
    current_texture: Option<Texture2D>,
    session: Option<Session>,

    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uniform_buffer: GpuBuffer,
    alpha_pipeline: GpuPipeline,
    composite_pipeline: GpuPipeline,
    sampler: GpuSampler,
    placeholder: Texture2D,
    effect: EffectRef,

    tolerate_missing: bool,
    stats: BatchStats,
}

impl SpriteBatch {
    /// Create the batcher, its GPU buffers, and its two pipeline variants.
    pub fn new(
        device: &dyn GraphicsDevice,
        effects: &mut EffectCache,
        samplers: &mut SamplerCache,
        desc: &SpriteBatchDesc,
    ) -> Self {
        let source = include_str!("shaders/sprite.wgsl");
        let effect = effects.get_or_create(
            device,
            &EffectDesc {
                label: "sprite",
                vertex_source: source,
                fragment_source: source,
                defines: &[],
                vertex_stride: SPRITE_VERTEX_STRIDE,
                vertex_attributes: &SPRITE_VERTEX_ATTRIBUTES,
            },
        );

        let alpha_pipeline = device.create_pipeline(&PipelineDesc {
            label: "sprite_alpha",
            shader: effect.shader(),
            vertex_stride: effect.stride(),
            vertex_attributes: effect.attributes(),
            uniform_slots: 1,
            texture_slots: 1,
            blend: BlendMode::Alpha,
            color_mask: ColorMask::All,
            depth: DepthMode::Ignore,
            cull: CullMode::None,
            color_formats: &[desc.target_format],
        });

        let composite_pipeline = device.create_pipeline(&PipelineDesc {
            label: "sprite_composite",
            shader: effect.shader(),
            vertex_stride: effect.stride(),
            vertex_attributes: effect.attributes(),
            uniform_slots: 1,
            texture_slots: 1,
            blend: BlendMode::Opaque,
            color_mask: ColorMask::ColorOnly,
            depth: DepthMode::Disabled,
            cull: CullMode::None,
            color_formats: &[desc.surface_format],
        });

        let vertex_buffer = device.create_buffer(&BufferDesc {
            label: "sprite_vertices",
            size: (MAX_SPRITES * VERTICES_PER_SPRITE) as u64 * SPRITE_VERTEX_STRIDE,
            kind: BufferKind::Vertex,
        });
        let index_buffer = device.create_buffer(&BufferDesc {
            label: "sprite_indices",
            size: (MAX_SPRITES * INDICES_PER_SPRITE * std::mem::size_of::<u16>()) as u64,
            kind: BufferKind::Index,
        });
        let uniform_buffer = device.create_buffer(&BufferDesc {
            label: "sprite_uniforms",
            size: std::mem::size_of::<Mat4>() as u64,
            kind: BufferKind::Uniform,
        });

        Self {
            vertices: Vec::with_capacity(MAX_SPRITES * VERTICES_PER_SPRITE),
            indices: Vec::with_capacity(MAX_SPRITES * INDICES_PER_SPRITE),
            pending: 0,
            current_texture: None,
            session: None,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            alpha_pipeline,
            composite_pipeline,
            sampler: samplers.linear_clamp(device),
            placeholder: Texture2D::placeholder(device),
            effect,
            tolerate_missing: desc.tolerate_missing,
            stats: BatchStats::default(),
        }
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Statistics of the current (or last completed) session.
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Open a batch session on the given pass target.
    ///
    /// Uploads the combined projection x transform matrix and begins the
    /// device pass. Fails with [`BatchError::SessionAlreadyOpen`] if a
    /// session is active.
    pub fn begin(
        &mut self,
        device: &dyn GraphicsDevice,
        target: PassTarget,
        options: &BatchOptions,
    ) -> BatchResult<()> {
        profile_function!();
        if self.session.is_some() {
            tracing::error!("sprite batch begin() inside an open session");
            return Err(BatchError::SessionAlreadyOpen);
        }

        let (width, height) = match target {
            PassTarget::Surface => device.surface_size(),
            PassTarget::Framebuffer(fb) => (fb.width(), fb.height()),
        };

        let projection = options.projection.unwrap_or_else(|| {
            Mat4::orthographic_rh(0.0, width as f32, height as f32, 0.0, -1.0, 1.0)
        });
        let combined = projection * options.transform.unwrap_or(Mat4::IDENTITY);
        device.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::cast_slice(&[combined]),
        );

        device.begin_pass(&PassDesc {
            label: "sprite_batch",
            target,
            clear_color: options.clear.map(Color::to_array),
            clear_depth: None,
        });
        device.set_viewport(0.0, 0.0, width as f32, height as f32);

        let pipeline = match options.blend {
            BatchBlend::Alpha => self.alpha_pipeline.clone(),
            BatchBlend::Composite => self.composite_pipeline.clone(),
        };
        self.session = Some(Session { pipeline });
        self.stats = BatchStats::default();
        Ok(())
    }

    /// Record one sprite.
    ///
    /// Breaks the current run (implicit flush) when the texture changes or
    /// the batch is at capacity. Fails with [`BatchError::SessionNotOpen`]
    /// outside a session, and with [`BatchError::MissingTexture`] when
    /// `texture` is `None` and tolerance is disabled.
    pub fn draw(
        &mut self,
        device: &dyn GraphicsDevice,
        texture: Option<&Texture2D>,
        sprite: &SpriteDesc,
    ) -> BatchResult<()> {
        if self.session.is_none() {
            tracing::error!("sprite batch draw() outside a session");
            return Err(BatchError::SessionNotOpen);
        }

        let (tex_id, tex_width, tex_height) = match texture {
            Some(t) => (t.id(), t.width() as f32, t.height() as f32),
            None if self.tolerate_missing => {
                tracing::warn!("sprite drawn with missing texture, using placeholder");
                (
                    self.placeholder.id(),
                    self.placeholder.width() as f32,
                    self.placeholder.height() as f32,
                )
            }
            None => {
                tracing::error!("sprite drawn with missing texture");
                return Err(BatchError::MissingTexture);
            }
        };

        let switching = self.current_texture.as_ref().map(Texture2D::id) != Some(tex_id);
        if switching || self.pending == MAX_SPRITES {
            self.flush(device);
        }
        if switching {
            self.current_texture = Some(match texture {
                Some(t) => t.clone(),
                None => self.placeholder.clone(),
            });
        }

        let source = sprite
            .source
            .unwrap_or(Rect::new(0.0, 0.0, tex_width, tex_height));
        let [u0, v0, u1, v1] = source_uvs(tex_width, tex_height, &source, sprite.flip);
        let corners = corner_positions(
            sprite.position,
            Vec2::new(source.width, source.height),
            sprite.origin,
            sprite.scale,
            sprite.rotation,
        );

        let tint = sprite.tint.to_array();
        let uvs = [[u0, v0], [u1, v0], [u1, v1], [u0, v1]];
        for (corner, uv) in corners.iter().zip(uvs) {
            self.vertices.push(SpriteVertex {
                position: (*corner).into(),
                texcoord: uv,
                color: tint,
            });
        }

        // Two triangles, clockwise winding: 0-1-3, 1-2-3.
        let base = (self.pending * VERTICES_PER_SPRITE) as u16;
        self.indices
            .extend_from_slice(&[base, base + 1, base + 3, base + 1, base + 2, base + 3]);

        self.pending += 1;
        self.stats.sprites += 1;
        Ok(())
    }

    /// Close the session: final flush, then end the device pass.
    pub fn end(&mut self, device: &dyn GraphicsDevice) -> BatchResult<()> {
        profile_function!();
        if self.session.is_none() {
            tracing::error!("sprite batch end() outside a session");
            return Err(BatchError::SessionNotOpen);
        }

        self.flush(device);
        device.end_pass();
        self.session = None;
        self.current_texture = None;
        Ok(())
    }

    /// Upload the pending run and issue its draw call.
    fn flush(&mut self, device: &dyn GraphicsDevice) {
        if self.pending == 0 {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let Some(texture) = &self.current_texture else {
            return;
        };

        // Only the range written since the last flush is transferred; the
        // vectors hold exactly the pending sprites.
        device.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&self.vertices));
        device.write_buffer(&self.index_buffer, 0, bytemuck::cast_slice(&self.indices));

        device.set_pipeline(&session.pipeline);
        device.set_uniform_buffer(0, &self.uniform_buffer, 0);
        device.set_vertex_buffer(&self.vertex_buffer);
        device.set_index_buffer(&self.index_buffer, IndexFormat::Uint16);
        device.set_texture(0, texture.gpu(), &self.sampler);
        device.draw_indexed((self.pending * INDICES_PER_SPRITE) as u32);

        tracing::trace!(sprites = self.pending, "flushed sprite batch");
        self.vertices.clear();
        self.indices.clear();
        self.pending = 0;
        self.stats.flushes += 1;
    }

    /// Release all GPU resources and the effect reference.
    pub fn dispose(self, device: &dyn GraphicsDevice, effects: &mut EffectCache) {
        device.destroy_buffer(self.vertex_buffer);
        device.destroy_buffer(self.index_buffer);
        device.destroy_buffer(self.uniform_buffer);
        self.placeholder.destroy(device);
        if let Err(e) = effects.release(device, self.effect.key()) {
            tracing::error!(error = %e, "failed to release sprite effect");
        }
    }
}

/// Normalize a source rectangle into 0-1 UV space and apply flips by
/// mirroring the relevant extent.
fn source_uvs(tex_width: f32, tex_height: f32, source: &Rect, flip: SpriteFlip) -> [f32; 4] {
    let mut u0 = source.x / tex_width;
    let mut v0 = source.y / tex_height;
    let mut u1 = (source.x + source.width) / tex_width;
    let mut v1 = (source.y + source.height) / tex_height;

    if flip.contains(SpriteFlip::X) {
        std::mem::swap(&mut u0, &mut u1);
    }
    if flip.contains(SpriteFlip::Y) {
        std::mem::swap(&mut v0, &mut v1);
    }
    [u0, v0, u1, v1]
}

/// Compute the four corner positions of a sprite quad, in
/// top-left/top-right/bottom-right/bottom-left order.
fn corner_positions(
    position: Vec2,
    source_size: Vec2,
    origin: Vec2,
    scale: Vec2,
    rotation: f32,
) -> [Vec2; 4] {
    let corners = [
        Vec2::ZERO,
        Vec2::new(source_size.x, 0.0),
        source_size,
        Vec2::new(0.0, source_size.y),
    ];

    let (sin, cos) = rotation.sin_cos();
    corners.map(|corner| {
        let local = (corner - origin) * scale;
        // Clockwise rotation in a y-down coordinate system.
        position + Vec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_uvs_normalize_to_unit_range() {
        let rect = Rect::new(32.0, 16.0, 32.0, 48.0);
        let [u0, v0, u1, v1] = source_uvs(128.0, 64.0, &rect, SpriteFlip::empty());
        assert_eq!([u0, v0, u1, v1], [0.25, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn flip_is_involutive() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        let plain = source_uvs(100.0, 100.0, &rect, SpriteFlip::empty());

        let once = source_uvs(100.0, 100.0, &rect, SpriteFlip::X);
        assert_ne!(plain, once);

        // Applying FlipX to already-flipped UVs reproduces the original.
        let twice = [once[2], once[1], once[0], once[3]];
        assert_eq!(plain, twice);

        let both = source_uvs(100.0, 100.0, &rect, SpriteFlip::X | SpriteFlip::Y);
        assert_eq!(both, [plain[2], plain[3], plain[0], plain[1]]);
    }

    #[test]
    fn corners_unrotated() {
        let corners = corner_positions(
            Vec2::new(10.0, 20.0),
            Vec2::new(4.0, 2.0),
            Vec2::ZERO,
            Vec2::ONE,
            0.0,
        );
        assert_eq!(corners[0], Vec2::new(10.0, 20.0));
        assert_eq!(corners[1], Vec2::new(14.0, 20.0));
        assert_eq!(corners[2], Vec2::new(14.0, 22.0));
        assert_eq!(corners[3], Vec2::new(10.0, 22.0));
    }

    #[test]
    fn corners_scale_around_origin() {
        let corners = corner_positions(
            Vec2::new(100.0, 100.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(3.0, 3.0),
            0.0,
        );
        // Origin sits at the quad center, so scaling is symmetric around it.
        assert_eq!(corners[0], Vec2::new(97.0, 97.0));
        assert_eq!(corners[2], Vec2::new(103.0, 103.0));
    }

    #[test]
    fn corners_quarter_turn() {
        let corners = corner_positions(
            Vec2::ZERO,
            Vec2::new(1.0, 0.0),
            Vec2::ZERO,
            Vec2::ONE,
            std::f32::consts::FRAC_PI_2,
        );
        // A y-down clockwise quarter turn maps +x onto +y.
        assert!((corners[1].x - 0.0).abs() < 1e-6);
        assert!((corners[1].y - 1.0).abs() < 1e-6);
    }
}
