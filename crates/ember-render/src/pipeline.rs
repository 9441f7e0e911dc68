//! The render pipeline: frame lifecycle, draw ordering, and composition.
//!
//! A frame walks `Idle -> new_frame -> (3D pass)* -> (2D pass)* ->
//! end_frame -> Idle`. The scene is drawn into an off-screen main target,
//! which `end_frame` composites onto the presented surface through the
//! sprite batcher. Out-of-order calls are contract violations surfaced as
//! [`FrameError`] and never masked.

use std::fmt;
use std::sync::Arc;

use glam::{Mat4, Vec2};

use ember_core::profiling::profile_function;
use ember_test_utils::{DeviceError, GraphicsDevice, PassDesc, PassTarget, PresentMode};

use crate::camera::CameraInfo;
use crate::color::Color;
use crate::effect::EffectCache;
use crate::mesh::Renderable;
use crate::sampler_cache::SamplerCache;
use crate::sprite_batch::{
    BatchBlend, BatchError, BatchOptions, SpriteBatch, SpriteBatchDesc, SpriteDesc,
};
use crate::strategy::{
    DeferredStrategy, ForwardStrategy, PassError, SceneStrategy, StrategyKind,
};
use crate::target::{RenderTarget, RenderTargetDesc, MAIN_TARGET_FORMAT};
use crate::texture::Texture2D;

/// One 3D draw submission: a renderable and its world transform.
#[derive(Clone, Copy)]
pub struct SceneDraw<'a> {
    pub renderable: &'a Renderable,
    pub world: Mat4,
}

/// Frame-lifecycle contract violations and device failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// `new_frame` called while a frame is open.
    FrameAlreadyOpen,
    /// A pass or `end_frame` was requested with no open frame.
    FrameNotOpen,
    /// A 3D pass was requested after the 2D phase began; the 3D pass must
    /// fully complete before any 2D work.
    SceneAfterOverlay,
    /// `resize` called while a frame is open.
    ResizeDuringFrame,
    /// A strategy pass-state violation.
    Pass(PassError),
    /// A sprite batch session violation.
    Batch(BatchError),
    /// The device failed to begin the frame (e.g. surface lost).
    Device(DeviceError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::FrameAlreadyOpen => write!(f, "frame already open"),
            FrameError::FrameNotOpen => write!(f, "no frame open"),
            FrameError::SceneAfterOverlay => {
                write!(f, "3D pass requested after the 2D phase began")
            }
            FrameError::ResizeDuringFrame => write!(f, "resize requested mid-frame"),
            FrameError::Pass(e) => write!(f, "scene pass error: {}", e),
            FrameError::Batch(e) => write!(f, "sprite batch error: {}", e),
            FrameError::Device(e) => write!(f, "device error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Pass(e) => Some(e),
            FrameError::Batch(e) => Some(e),
            FrameError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PassError> for FrameError {
    fn from(e: PassError) -> Self {
        FrameError::Pass(e)
    }
}

impl From<BatchError> for FrameError {
    fn from(e: BatchError) -> Self {
        FrameError::Batch(e)
    }
}

/// Result type alias for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Per-frame statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    /// Renderables submitted through the 3D passes.
    pub renderables: usize,
    /// Sprites drawn through the 2D passes (composition excluded).
    pub sprites: usize,
    /// Sprite batch flushes, i.e. 2D draw calls (composition excluded).
    pub sprite_flushes: usize,
}

/// Renderer construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct RendererDesc {
    pub width: u32,
    pub height: u32,
    pub strategy: StrategyKind,
    pub present_mode: PresentMode,
    /// Color the main target is cleared to each frame.
    pub clear_color: Color,
    /// Substitute a placeholder for missing sprite textures instead of
    /// failing.
    pub tolerate_missing_assets: bool,
}

impl Default for RendererDesc {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            strategy: StrategyKind::Forward,
            present_mode: PresentMode::Vsync,
            clear_color: Color::BLACK,
            tolerate_missing_assets: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Idle,
    /// Frame open, 3D passes permitted.
    Scene,
    /// 2D phase begun; no further 3D passes this frame.
    Overlay,
}

struct QueuedSprite {
    texture: Option<Texture2D>,
    sprite: SpriteDesc,
    depth: f32,
}

/// Owns the main off-screen target, the sprite batcher, the effect cache,
/// and the active 3D strategy, and drives the per-frame pipeline.
pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    effects: EffectCache,
    samplers: SamplerCache,
    sprite_batch: Option<SpriteBatch>,
    strategy: Option<Box<dyn SceneStrategy>>,
    main_target: RenderTarget,
    phase: FramePhase,
    sprite_queue: Vec<QueuedSprite>,
    clear_color: Color,
    present_mode: PresentMode,
    stats: FrameStats,
}

impl Renderer {
    /// Create the renderer, its main target, and the selected strategy.
    pub fn new(device: Arc<dyn GraphicsDevice>, desc: &RendererDesc) -> Self {
        device.configure_surface(desc.width, desc.height, desc.present_mode);

        let mut effects = EffectCache::new();
        let mut samplers = SamplerCache::new();

        let main_target = RenderTarget::new(
            &*device,
            &RenderTargetDesc {
                label: "main_target",
                width: desc.width,
                height: desc.height,
                color_formats: &[MAIN_TARGET_FORMAT],
                depth: true,
            },
        );

        let sprite_batch = SpriteBatch::new(
            &*device,
            &mut effects,
            &mut samplers,
            &SpriteBatchDesc {
                target_format: MAIN_TARGET_FORMAT,
                surface_format: device.surface_format(),
                tolerate_missing: desc.tolerate_missing_assets,
            },
        );

        let strategy: Box<dyn SceneStrategy> = match desc.strategy {
            StrategyKind::Forward => Box::new(ForwardStrategy::new(
                &*device,
                &mut effects,
                &mut samplers,
            )),
            StrategyKind::Deferred => Box::new(DeferredStrategy::new(
                &*device,
                &mut effects,
                &mut samplers,
                desc.width,
                desc.height,
            )),
        };

        tracing::info!(
            width = desc.width,
            height = desc.height,
            strategy = ?desc.strategy,
            "renderer initialized"
        );

        Self {
            device,
            effects,
            samplers,
            sprite_batch: Some(sprite_batch),
            strategy: Some(strategy),
            main_target,
            phase: FramePhase::Idle,
            sprite_queue: Vec::new(),
            clear_color: desc.clear_color,
            present_mode: desc.present_mode,
            stats: FrameStats::default(),
        }
    }

    /// The device this renderer submits to.
    pub fn device(&self) -> &dyn GraphicsDevice {
        &*self.device
    }

    /// The effect cache, for material creation and disposal.
    pub fn effects_mut(&mut self) -> &mut EffectCache {
        &mut self.effects
    }

    /// The sampler cache.
    pub fn samplers_mut(&mut self) -> &mut SamplerCache {
        &mut self.samplers
    }

    /// The main off-screen target the scene is drawn into.
    pub fn main_target(&self) -> &RenderTarget {
        &self.main_target
    }

    /// Statistics of the current (or last completed) frame.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Open a frame: acquire the surface and clear the main target's color
    /// and depth.
    pub fn new_frame(&mut self) -> FrameResult<()> {
        profile_function!();
        if self.phase != FramePhase::Idle {
            tracing::error!("new_frame() while a frame is open");
            return Err(FrameError::FrameAlreadyOpen);
        }

        if let Err(e) = self.device.begin_frame() {
            // A lost surface is recoverable: reconfigure now, the host
            // retries next frame.
            tracing::warn!(error = %e, "failed to begin frame");
            if e == DeviceError::SurfaceLost {
                let (width, height) = self.device.surface_size();
                self.device
                    .configure_surface(width, height, self.present_mode);
            }
            return Err(FrameError::Device(e));
        }

        self.stats = FrameStats::default();

        let clear = self.clear_color;
        self.device.begin_pass(&PassDesc {
            label: "frame_clear",
            target: PassTarget::Framebuffer(self.main_target.framebuffer()),
            clear_color: Some(clear.to_array()),
            clear_depth: Some(1.0),
        });
        self.device.end_pass();

        self.phase = FramePhase::Scene;
        Ok(())
    }

    /// Run one 3D pass over the submitted draws.
    ///
    /// Opaque renderables are drawn front-to-back, translucent renderables
    /// back-to-front; ties keep submission order.
    pub fn perform_3d_pass(
        &mut self,
        camera: &CameraInfo,
        draws: &[SceneDraw],
    ) -> FrameResult<()> {
        profile_function!();
        match self.phase {
            FramePhase::Idle => {
                tracing::error!("perform_3d_pass() with no open frame");
                return Err(FrameError::FrameNotOpen);
            }
            FramePhase::Overlay => {
                tracing::error!("perform_3d_pass() after the 2D phase began");
                return Err(FrameError::SceneAfterOverlay);
            }
            FramePhase::Scene => {}
        }

        let order = sorted_draw_order(draws, camera);

        let device = Arc::clone(&self.device);
        let strategy = self.strategy.as_mut().expect("renderer already disposed");
        strategy.begin_pass(&*device, camera, &self.main_target)?;
        for index in &order {
            let draw = &draws[*index];
            strategy.draw_renderable(&*device, draw.renderable, draw.world)?;
        }
        strategy.end_pass(&*device, &self.main_target)?;

        self.stats.renderables += draws.len();
        Ok(())
    }

    /// Queue a sprite for the next 2D pass. `depth` is the ascending sort
    /// key; equal depths preserve queueing order.
    pub fn queue_sprite(&mut self, texture: Option<&Texture2D>, sprite: SpriteDesc, depth: f32) {
        self.sprite_queue.push(QueuedSprite {
            texture: texture.cloned(),
            sprite,
            depth,
        });
    }

    /// Drain the sprite queue in depth order through the batcher, onto the
    /// main target.
    pub fn perform_2d_pass(&mut self) -> FrameResult<()> {
        profile_function!();
        if self.phase == FramePhase::Idle {
            tracing::error!("perform_2d_pass() with no open frame");
            return Err(FrameError::FrameNotOpen);
        }
        self.phase = FramePhase::Overlay;

        let mut queue = std::mem::take(&mut self.sprite_queue);
        // Stable: equal depth keys keep insertion order.
        queue.sort_by(|a, b| a.depth.partial_cmp(&b.depth).unwrap_or(std::cmp::Ordering::Equal));

        let device = Arc::clone(&self.device);
        let batch = self.sprite_batch.as_mut().expect("renderer already disposed");
        batch.begin(
            &*device,
            PassTarget::Framebuffer(self.main_target.framebuffer()),
            &BatchOptions::default(),
        )?;
        for queued in &queue {
            batch.draw(&*device, queued.texture.as_ref(), &queued.sprite)?;
        }
        batch.end(&*device)?;

        let stats = batch.stats();
        self.stats.sprites += stats.sprites;
        self.stats.sprite_flushes += stats.flushes;
        Ok(())
    }

    /// Composite the main target onto the surface and present.
    ///
    /// The blit is a single full-target sprite drawn with a
    /// color-channels-only blend state so destination alpha stays intact.
    pub fn end_frame(&mut self) -> FrameResult<()> {
        profile_function!();
        if self.phase == FramePhase::Idle {
            tracing::error!("end_frame() with no open frame");
            return Err(FrameError::FrameNotOpen);
        }

        let (surface_width, surface_height) = self.device.surface_size();
        let (target_width, target_height) = self.main_target.size();
        let composite = Texture2D::from_gpu(
            self.main_target.color_texture().clone(),
            target_width,
            target_height,
            MAIN_TARGET_FORMAT,
        );

        let device = Arc::clone(&self.device);
        let batch = self.sprite_batch.as_mut().expect("renderer already disposed");
        batch.begin(
            &*device,
            PassTarget::Surface,
            &BatchOptions {
                blend: BatchBlend::Composite,
                clear: Some(Color::BLACK),
                ..Default::default()
            },
        )?;
        batch.draw(
            &*device,
            Some(&composite),
            &SpriteDesc {
                scale: Vec2::new(
                    surface_width as f32 / target_width as f32,
                    surface_height as f32 / target_height as f32,
                ),
                ..Default::default()
            },
        )?;
        batch.end(&*device)?;

        self.device.end_frame();
        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Resize the presentation surface, the main target, and any fixed-size
    /// strategy attachments. Only legal between frames.
    pub fn resize(&mut self, width: u32, height: u32) -> FrameResult<()> {
        if self.phase != FramePhase::Idle {
            tracing::error!("resize() mid-frame");
            return Err(FrameError::ResizeDuringFrame);
        }
        if (width, height) == self.main_target.size() {
            return Ok(());
        }

        let device = Arc::clone(&self.device);
        device.configure_surface(width, height, self.present_mode);
        self.main_target.resize(&*device, width, height);
        self.strategy
            .as_mut()
            .expect("renderer already disposed")
            .resize(&*device, width, height);

        tracing::debug!(width, height, "renderer resized");
        Ok(())
    }

    /// Release every GPU resource the renderer owns.
    ///
    /// Renderables, materials, and textures created by the host are not
    /// touched; dispose those separately.
    pub fn dispose(mut self) {
        let device = Arc::clone(&self.device);
        if let Some(batch) = self.sprite_batch.take() {
            batch.dispose(&*device, &mut self.effects);
        }
        if let Some(strategy) = self.strategy.take() {
            strategy.dispose(&*device, &mut self.effects);
        }
        self.main_target.destroy(&*device);

        if !self.effects.is_empty() {
            tracing::warn!(
                live = self.effects.len(),
                "effects still referenced at renderer disposal"
            );
        }
    }
}

/// Draw order for a 3D pass: opaque draws front-to-back, then translucent
/// draws back-to-front, each stable over submission order.
fn sorted_draw_order(draws: &[SceneDraw], camera: &CameraInfo) -> Vec<usize> {
    let distance = |index: usize| -> f32 {
        draws[index]
            .world
            .w_axis
            .truncate()
            .distance_squared(camera.position)
    };

    let mut opaque: Vec<usize> = Vec::new();
    let mut translucent: Vec<usize> = Vec::new();
    for (index, draw) in draws.iter().enumerate() {
        if draw.renderable.material().translucent {
            translucent.push(index);
        } else {
            opaque.push(index);
        }
    }

    opaque.sort_by(|&a, &b| {
        distance(a)
            .partial_cmp(&distance(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    translucent.sort_by(|&a, &b| {
        distance(b)
            .partial_cmp(&distance(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    opaque.extend(translucent);
    opaque
}
