//! Ember rendering core.
//!
//! A real-time rendering core for interactive applications:
//!
//! - [`SpriteBatch`] batches 2D draw requests into minimal GPU submissions,
//!   one indexed draw per same-texture run, with implicit flush on texture
//!   change and capacity.
//! - [`EffectCache`] deduplicates compiled shader + input-layout bundles by
//!   content hash, with explicit reference counting.
//! - [`Renderer`] drives the per-frame pipeline: the scene is drawn into an
//!   off-screen main target and composited onto the presented surface, with
//!   a pluggable forward or deferred (G-buffer) 3D strategy.
//!
//! All GPU work flows through the [`GraphicsDevice`] trait
//! (re-exported from `ember-test-utils`); [`WgpuDevice`] is the production
//! implementation, and the `mock` feature provides a call-recording device
//! so batching and resource-lifetime invariants are testable without a GPU.
//!
//! Single-threaded by design: one rendering thread records and submits all
//! frames.

pub mod camera;
pub mod color;
pub mod context;
pub mod device_impl;
pub mod effect;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod sampler_cache;
pub mod sprite_batch;
pub mod strategy;
pub mod target;
pub mod texture;

pub use camera::CameraInfo;
pub use color::Color;
pub use context::{GraphicsContext, SurfaceContext};
pub use device_impl::WgpuDevice;
pub use effect::{CacheError, EffectCache, EffectDesc, EffectKey, EffectRef};
pub use material::{Material, TextureSlot};
pub use mesh::{MeshData, MeshVertex, Renderable};
pub use pipeline::{
    FrameError, FrameStats, Renderer, RendererDesc, SceneDraw,
};
pub use sampler_cache::SamplerCache;
pub use sprite_batch::{
    BatchBlend, BatchError, BatchOptions, Rect, SpriteBatch, SpriteBatchDesc, SpriteDesc,
    SpriteFlip, SpriteVertex, MAX_SPRITES,
};
pub use strategy::{DeferredStrategy, ForwardStrategy, PassError, SceneStrategy, StrategyKind};
pub use target::{RenderTarget, RenderTargetDesc, MAIN_TARGET_FORMAT};
pub use texture::{PixelData, Texture2D, TextureError};

// The device abstraction is part of the public surface.
pub use ember_test_utils::{GraphicsDevice, PassTarget, PresentMode};
