//! Effect cache: content-hashed, reference-counted shader + input-layout
//! bundles.
//!
//! Shader compilation is the most expensive operation in the pipeline, and
//! many materials share identical shader/define/layout combinations. The
//! cache turns O(materials) compiles into O(distinct variants) compiles by
//! keying entries on a deterministic hash of the shader sources and
//! preprocessor defines. Reclamation is explicit: entries are destroyed when
//! their reference count returns to zero, never by garbage collection.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use ahash::HashMap;
use ember_core::profiling::profile_function;
use ember_test_utils::{GpuShader, GraphicsDevice, ShaderDesc, VertexAttribute};

/// Descriptor for requesting an effect from the cache.
///
/// `vertex_source` and `fragment_source` may reference the same WGSL module
/// (the common case for single-file shaders with both entry points); the
/// module is compiled once either way. Defines are injected as abstract-typed
/// `const NAME = VALUE;` declarations ahead of the source.
#[derive(Debug, Clone)]
pub struct EffectDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub defines: &'a [(&'a str, &'a str)],
    pub vertex_stride: u64,
    pub vertex_attributes: &'a [VertexAttribute],
}

/// Stable content key of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectKey(u64);

/// A counted reference into the effect cache.
///
/// Cloning an `EffectRef` does not change the reference count; counting
/// happens only through [`EffectCache::get_or_create`] and
/// [`EffectCache::release`]. Whoever acquired must release exactly once.
#[derive(Debug, Clone)]
pub struct EffectRef {
    key: EffectKey,
    shader: GpuShader,
    attributes: Arc<[VertexAttribute]>,
    stride: u64,
}

impl EffectRef {
    /// The cache key this reference was acquired under.
    pub fn key(&self) -> EffectKey {
        self.key
    }

    /// The shared compiled shader.
    pub fn shader(&self) -> &GpuShader {
        &self.shader
    }

    /// The shared vertex input layout.
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// The vertex stride in bytes.
    pub fn stride(&self) -> u64 {
        self.stride
    }
}

/// Errors raised by cache bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A release was attempted for a key that holds no acquired reference.
    /// Continuing would risk a double-destroy of the compiled shader.
    ReleaseWithoutAcquire,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ReleaseWithoutAcquire => {
                write!(f, "effect released without a matching acquire")
            }
        }
    }
}

impl std::error::Error for CacheError {}

struct EffectEntry {
    shader: GpuShader,
    attributes: Arc<[VertexAttribute]>,
    stride: u64,
    refs: usize,
}

/// Process-lifetime cache of compiled shader + layout bundles.
pub struct EffectCache {
    entries: HashMap<EffectKey, EffectEntry>,
    hasher: ahash::RandomState,
}

impl Default for EffectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::default(),
            // Fixed seeds keep the content key deterministic.
            hasher: ahash::RandomState::with_seeds(
                0x45_4d_42_45, 0x52_5f_46_58, 0x43_41_43_48, 0x45_5f_4b_31,
            ),
        }
    }

    fn key_of(&self, desc: &EffectDesc) -> EffectKey {
        let mut hasher = self.hasher.build_hasher();
        desc.vertex_source.hash(&mut hasher);
        desc.fragment_source.hash(&mut hasher);
        for (name, value) in desc.defines {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        EffectKey(hasher.finish())
    }

    /// Look up an effect, compiling it on first request.
    ///
    /// An existing entry has its reference count incremented and its shared
    /// shader/layout returned; a new entry starts at count 1.
    pub fn get_or_create(&mut self, device: &dyn GraphicsDevice, desc: &EffectDesc) -> EffectRef {
        profile_function!();
        let key = self.key_of(desc);

        let entry = match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(e) => {
                let entry = e.into_mut();
                entry.refs += 1;
                tracing::trace!(label = desc.label, refs = entry.refs, "effect cache hit");
                entry
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                let source = compose_source(desc);
                let shader = device.create_shader(&ShaderDesc {
                    label: desc.label,
                    source: &source,
                });
                tracing::debug!(label = desc.label, "compiled effect");
                e.insert(EffectEntry {
                    shader,
                    attributes: desc.vertex_attributes.into(),
                    stride: desc.vertex_stride,
                    refs: 1,
                })
            }
        };

        EffectRef {
            key,
            shader: entry.shader.clone(),
            attributes: Arc::clone(&entry.attributes),
            stride: entry.stride,
        }
    }

    /// Release one acquired reference.
    ///
    /// When the count reaches zero the compiled shader is destroyed and the
    /// entry removed. Releasing a key with no live reference is a
    /// double-free hazard and fails.
    pub fn release(
        &mut self,
        device: &dyn GraphicsDevice,
        key: EffectKey,
    ) -> Result<(), CacheError> {
        let Some(entry) = self.entries.get_mut(&key) else {
            tracing::error!(?key, "effect released without a matching acquire");
            return Err(CacheError::ReleaseWithoutAcquire);
        };

        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(entry) = self.entries.remove(&key) {
                device.destroy_shader(entry.shader);
                tracing::debug!(?key, "destroyed effect");
            }
        }
        Ok(())
    }

    /// Current reference count for a key (0 if absent).
    pub fn ref_count(&self, key: EffectKey) -> usize {
        self.entries.get(&key).map_or(0, |e| e.refs)
    }

    /// Number of distinct cached effects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn compose_source(desc: &EffectDesc) -> String {
    let mut source = String::new();
    for (name, value) in desc.defines {
        source.push_str(&format!("const {} = {};\n", name, value));
    }
    source.push_str(desc.vertex_source);
    if desc.fragment_source != desc.vertex_source {
        source.push('\n');
        source.push_str(desc.fragment_source);
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc<'a>(defines: &'a [(&'a str, &'a str)]) -> EffectDesc<'a> {
        EffectDesc {
            label: "test",
            vertex_source: "@vertex fn vs_main() {}",
            fragment_source: "@fragment fn fs_main() {}",
            defines,
            vertex_stride: 32,
            vertex_attributes: &[],
        }
    }

    #[test]
    fn key_is_deterministic() {
        let cache = EffectCache::new();
        let a = cache.key_of(&desc(&[("LIT", "1")]));
        let b = cache.key_of(&desc(&[("LIT", "1")]));
        assert_eq!(a, b);
    }

    #[test]
    fn defines_distinguish_keys() {
        let cache = EffectCache::new();
        let a = cache.key_of(&desc(&[("LIT", "1")]));
        let b = cache.key_of(&desc(&[("LIT", "0")]));
        let c = cache.key_of(&desc(&[]));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn defines_are_prepended_as_consts() {
        let d = desc(&[("MAX_LIGHTS", "4u")]);
        let source = compose_source(&d);
        assert!(source.starts_with("const MAX_LIGHTS = 4u;\n"));
    }

    #[test]
    fn identical_stage_sources_compose_once() {
        let d = EffectDesc {
            label: "single",
            vertex_source: "shared module",
            fragment_source: "shared module",
            defines: &[],
            vertex_stride: 16,
            vertex_attributes: &[],
        };
        assert_eq!(compose_source(&d), "shared module");
    }
}
