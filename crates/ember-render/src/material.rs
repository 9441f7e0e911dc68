//! Materials: a shared effect reference plus fixed-slot texture bindings and
//! raster state.
//!
//! A material holds exactly one counted reference into the effect cache.
//! Disposing the material releases that reference; the underlying compiled
//! shader is destroyed only when the last material using it is disposed.

use ember_test_utils::{CullMode, GraphicsDevice};

use crate::color::Color;
use crate::effect::{CacheError, EffectCache, EffectRef};
use crate::texture::Texture2D;

/// Fixed texture slot indices a material can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    Albedo = 0,
    Normal = 1,
    Metallic = 2,
    Roughness = 3,
    AmbientOcclusion = 4,
}

impl TextureSlot {
    /// Number of material texture slots.
    pub const COUNT: usize = 5;

    /// Slot index as used by the device binding model.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A surface description: effect + textures + raster state.
#[derive(Debug)]
pub struct Material {
    effect: EffectRef,
    textures: [Option<Texture2D>; TextureSlot::COUNT],
    pub tint: Color,
    /// UV tiling factor applied to all texture slots.
    pub tiling: f32,
    /// Rasterizer state used when drawing with this material.
    pub cull: CullMode,
    /// Translucent materials blend and are sorted back-to-front.
    pub translucent: bool,
    disposed: bool,
}

impl Material {
    /// Create an opaque material around an acquired effect reference.
    pub fn new(effect: EffectRef) -> Self {
        Self {
            effect,
            textures: [None, None, None, None, None],
            tint: Color::WHITE,
            tiling: 1.0,
            cull: CullMode::Back,
            translucent: false,
            disposed: false,
        }
    }

    /// Builder-style texture assignment.
    pub fn with_texture(mut self, slot: TextureSlot, texture: Texture2D) -> Self {
        self.textures[slot.index()] = Some(texture);
        self
    }

    /// Builder-style translucency flag.
    pub fn with_translucency(mut self, translucent: bool) -> Self {
        self.translucent = translucent;
        self
    }

    /// Builder-style tint.
    pub fn with_tint(mut self, tint: Color) -> Self {
        self.tint = tint;
        self
    }

    /// Assign or clear a texture slot.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<Texture2D>) {
        self.textures[slot.index()] = texture;
    }

    /// The texture bound at a slot, if any.
    pub fn texture(&self, slot: TextureSlot) -> Option<&Texture2D> {
        self.textures[slot.index()].as_ref()
    }

    /// The shared effect this material draws with.
    pub fn effect(&self) -> &EffectRef {
        &self.effect
    }

    /// Whether the material has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release this material's effect reference.
    ///
    /// Idempotent: repeated disposal is a no-op. Textures are shared and
    /// remain owned by their creator.
    pub fn dispose(
        &mut self,
        device: &dyn GraphicsDevice,
        effects: &mut EffectCache,
    ) -> Result<(), CacheError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        effects.release(device, self.effect.key())
    }
}
