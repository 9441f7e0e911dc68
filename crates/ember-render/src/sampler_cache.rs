//! Sampler cache for GPU sampler reuse.
//!
//! Sampler state objects are small but the driver-side objects are worth
//! deduplicating; identical descriptors share one sampler.

use ahash::HashMap;

use ember_test_utils::{AddressMode, FilterMode, GpuSampler, GraphicsDevice, SamplerDesc};

/// A cache of GPU samplers keyed by their descriptor.
pub struct SamplerCache {
    cache: HashMap<SamplerDesc, GpuSampler>,
}

impl Default for SamplerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerCache {
    /// Create a new empty sampler cache.
    pub fn new() -> Self {
        Self {
            cache: HashMap::default(),
        }
    }

    /// Get a sampler from the cache or create a new one.
    pub fn get_or_create(&mut self, device: &dyn GraphicsDevice, desc: SamplerDesc) -> GpuSampler {
        self.cache
            .entry(desc)
            .or_insert_with(|| device.create_sampler(&desc))
            .clone()
    }

    /// Linear filtering, clamped addressing.
    pub fn linear_clamp(&mut self, device: &dyn GraphicsDevice) -> GpuSampler {
        self.get_or_create(
            device,
            SamplerDesc {
                filter: FilterMode::Linear,
                address: AddressMode::ClampToEdge,
            },
        )
    }

    /// Linear filtering, repeating addressing (tiled materials).
    pub fn linear_repeat(&mut self, device: &dyn GraphicsDevice) -> GpuSampler {
        self.get_or_create(
            device,
            SamplerDesc {
                filter: FilterMode::Linear,
                address: AddressMode::Repeat,
            },
        )
    }

    /// Nearest filtering, clamped addressing (pixel art).
    pub fn nearest_clamp(&mut self, device: &dyn GraphicsDevice) -> GpuSampler {
        self.get_or_create(
            device,
            SamplerDesc {
                filter: FilterMode::Nearest,
                address: AddressMode::ClampToEdge,
            },
        )
    }

    /// Number of distinct samplers created.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
