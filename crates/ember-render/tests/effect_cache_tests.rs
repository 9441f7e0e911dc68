//! Effect cache reference counting and material/renderable lifetime.

use std::sync::Arc;

use ember_render::{
    CacheError, EffectCache, EffectDesc, Material, MeshData, MeshVertex, Renderable, Texture2D,
};
use ember_test_utils::MockDevice;

fn lit_effect<'a>(defines: &'a [(&'a str, &'a str)]) -> EffectDesc<'a> {
    EffectDesc {
        label: "lit",
        vertex_source: "// vertex stage",
        fragment_source: "// fragment stage",
        defines,
        vertex_stride: 32,
        vertex_attributes: &[],
    }
}

#[test]
fn identical_requests_share_one_compile() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();

    let first = cache.get_or_create(&device, &lit_effect(&[]));
    let second = cache.get_or_create(&device, &lit_effect(&[]));

    assert_eq!(device.count_shader_creates(), 1);
    assert_eq!(first.key(), second.key());
    assert_eq!(first.shader().id(), second.shader().id());
    assert_eq!(cache.ref_count(first.key()), 2);

    cache.release(&device, first.key()).unwrap();
    assert_eq!(cache.ref_count(first.key()), 1);
    assert_eq!(device.count_shader_destroys(), 0);

    cache.release(&device, second.key()).unwrap();
    assert_eq!(cache.ref_count(second.key()), 0);
    assert!(cache.is_empty());
    // The shared shader is destroyed exactly once.
    assert_eq!(device.count_shader_destroys(), 1);
}

#[test]
fn release_without_acquire_is_fatal() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();

    let effect = cache.get_or_create(&device, &lit_effect(&[]));
    cache.release(&device, effect.key()).unwrap();
    assert_eq!(
        cache.release(&device, effect.key()),
        Err(CacheError::ReleaseWithoutAcquire)
    );
    assert_eq!(device.count_shader_destroys(), 1);
}

#[test]
fn distinct_defines_compile_separately() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();

    let plain = cache.get_or_create(&device, &lit_effect(&[]));
    let skinned = cache.get_or_create(&device, &lit_effect(&[("SKINNED", "1u")]));

    assert_ne!(plain.key(), skinned.key());
    assert_eq!(device.count_shader_creates(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn material_dispose_is_idempotent() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();

    let effect = cache.get_or_create(&device, &lit_effect(&[]));
    let mut material = Material::new(effect);

    material.dispose(&device, &mut cache).unwrap();
    assert!(material.is_disposed());
    assert_eq!(device.count_shader_destroys(), 1);

    // A second dispose must not release (or destroy) again.
    material.dispose(&device, &mut cache).unwrap();
    assert_eq!(device.count_shader_destroys(), 1);
}

#[test]
fn materials_share_entries_until_last_dispose() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();

    let mut a = Material::new(cache.get_or_create(&device, &lit_effect(&[])));
    let mut b = Material::new(cache.get_or_create(&device, &lit_effect(&[])));
    assert_eq!(device.count_shader_creates(), 1);

    a.dispose(&device, &mut cache).unwrap();
    assert_eq!(device.count_shader_destroys(), 0);
    b.dispose(&device, &mut cache).unwrap();
    assert_eq!(device.count_shader_destroys(), 1);
}

#[test]
fn renderable_destroy_releases_both_buffers_once() {
    let device = MockDevice::new();
    let mut cache = EffectCache::new();
    let material = Arc::new(Material::new(cache.get_or_create(&device, &lit_effect(&[]))));

    let vertices = [MeshVertex {
        position: [0.0; 3],
        normal: [0.0, 1.0, 0.0],
        texcoord: [0.0; 2],
    }];
    let indices = [0u32, 0, 0];
    let mut renderable = Renderable::new(
        &device,
        "tri",
        &MeshData {
            vertices: &vertices,
            indices: &indices,
        },
        material,
    );
    assert_eq!(renderable.index_count(), 3);

    renderable.destroy(&device);
    assert!(renderable.is_destroyed());
    assert_eq!(device.count_buffer_destroys(), 2);

    // Idempotent.
    renderable.destroy(&device);
    assert_eq!(device.count_buffer_destroys(), 2);
}

#[test]
fn texture_payload_must_match_descriptor() {
    let device = MockDevice::new();
    let bytes = vec![0u8; 8];
    let result = Texture2D::from_pixels(
        &device,
        "bad",
        &ember_render::PixelData {
            width: 2,
            height: 2,
            format: ember_test_utils::TextureFormat::Rgba8UnormSrgb,
            bytes: &bytes,
        },
    );
    assert!(result.is_err());
    assert_eq!(device.count_texture_creates(), 0);
}
