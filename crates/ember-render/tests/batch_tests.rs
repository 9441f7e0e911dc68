//! Sprite batch behavior against the call-recording mock device.

use ember_render::{
    BatchError, BatchOptions, EffectCache, PassTarget, SamplerCache, SpriteBatch, SpriteBatchDesc,
    SpriteDesc, Texture2D, MAIN_TARGET_FORMAT, MAX_SPRITES,
};
use ember_render::{GraphicsDevice, PixelData};
use ember_test_utils::{DeviceCall, MockDevice, TextureFormat};

fn make_batch(device: &MockDevice, tolerate_missing: bool) -> (SpriteBatch, EffectCache) {
    let mut effects = EffectCache::new();
    let mut samplers = SamplerCache::new();
    let batch = SpriteBatch::new(
        device,
        &mut effects,
        &mut samplers,
        &SpriteBatchDesc {
            target_format: MAIN_TARGET_FORMAT,
            surface_format: device.surface_format(),
            tolerate_missing,
        },
    );
    (batch, effects)
}

fn make_texture(device: &MockDevice, width: u32, height: u32) -> Texture2D {
    let bytes = vec![255u8; (width * height * 4) as usize];
    Texture2D::from_pixels(
        device,
        "test",
        &PixelData {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            bytes: &bytes,
        },
    )
    .expect("well-sized payload")
}

#[test]
fn same_texture_run_is_one_draw_call() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture = make_texture(&device, 64, 64);
    device.clear_calls();

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    for _ in 0..5 {
        batch
            .draw(&device, Some(&texture), &SpriteDesc::default())
            .unwrap();
    }
    batch.end(&device).unwrap();

    assert_eq!(device.count_draw_calls(), 1);
    assert_eq!(device.draw_index_counts(), vec![30]);
    assert_eq!(batch.stats().flushes, 1);
    assert_eq!(batch.stats().sprites, 5);
}

#[test]
fn capacity_overflow_flushes_implicitly() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture = make_texture(&device, 8, 8);
    device.clear_calls();

    let total = MAX_SPRITES + 3;
    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    for _ in 0..total {
        batch
            .draw(&device, Some(&texture), &SpriteDesc::default())
            .unwrap();
    }
    batch.end(&device).unwrap();

    // ceil(total / MAX_SPRITES) draw calls, none covering more than a full
    // batch worth of indices.
    assert_eq!(device.count_draw_calls(), 2);
    assert_eq!(
        device.draw_index_counts(),
        vec![(MAX_SPRITES * 6) as u32, 18]
    );
}

#[test]
fn texture_transitions_break_runs() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture_a = make_texture(&device, 16, 16);
    let texture_b = make_texture(&device, 16, 16);
    device.clear_calls();

    // Three runs: A A | B B | A.
    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    for texture in [&texture_a, &texture_a, &texture_b, &texture_b, &texture_a] {
        batch
            .draw(&device, Some(texture), &SpriteDesc::default())
            .unwrap();
    }
    batch.end(&device).unwrap();

    assert_eq!(device.count_draw_calls(), 3);
    assert_eq!(device.draw_index_counts(), vec![12, 12, 6]);
    let binds: Vec<u64> = device.texture_binds().iter().map(|(_, id)| *id).collect();
    assert_eq!(binds, vec![texture_a.id(), texture_b.id(), texture_a.id()]);
}

#[test]
fn two_textures_two_draws_in_call_order() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture_a = make_texture(&device, 32, 32);
    let texture_b = make_texture(&device, 32, 32);
    device.clear_calls();

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    batch
        .draw(
            &device,
            Some(&texture_a),
            &SpriteDesc {
                position: glam::Vec2::new(0.0, 0.0),
                ..Default::default()
            },
        )
        .unwrap();
    batch
        .draw(
            &device,
            Some(&texture_b),
            &SpriteDesc {
                position: glam::Vec2::new(10.0, 10.0),
                ..Default::default()
            },
        )
        .unwrap();
    batch.end(&device).unwrap();

    assert_eq!(device.draw_index_counts(), vec![6, 6]);
    let binds: Vec<u64> = device.texture_binds().iter().map(|(_, id)| *id).collect();
    assert_eq!(binds, vec![texture_a.id(), texture_b.id()]);
}

#[test]
fn flush_uploads_only_the_pending_range() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture = make_texture(&device, 16, 16);
    device.clear_calls();

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    for _ in 0..3 {
        batch
            .draw(&device, Some(&texture), &SpriteDesc::default())
            .unwrap();
    }
    batch.end(&device).unwrap();

    let sizes: Vec<usize> = device
        .buffer_writes()
        .iter()
        .map(|(_, _, size)| *size)
        .collect();
    // Projection matrix, then 3 sprites worth of vertices and indices.
    assert!(sizes.contains(&64));
    assert!(sizes.contains(&(3 * 4 * 32)));
    assert!(sizes.contains(&(3 * 6 * 2)));
}

#[test]
fn session_violations_are_errors() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    let texture = make_texture(&device, 16, 16);

    assert_eq!(
        batch.draw(&device, Some(&texture), &SpriteDesc::default()),
        Err(BatchError::SessionNotOpen)
    );
    assert_eq!(batch.end(&device), Err(BatchError::SessionNotOpen));

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    assert_eq!(
        batch.begin(&device, PassTarget::Surface, &BatchOptions::default()),
        Err(BatchError::SessionAlreadyOpen)
    );
    batch.end(&device).unwrap();
}

#[test]
fn missing_texture_fails_without_tolerance() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    assert_eq!(
        batch.draw(&device, None, &SpriteDesc::default()),
        Err(BatchError::MissingTexture)
    );
    batch.end(&device).unwrap();
}

#[test]
fn missing_texture_uses_placeholder_when_tolerated() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, true);

    // The placeholder is the 1x1 texture created during batch construction.
    let placeholder_id = device
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::CreateTexture {
                id,
                width: 1,
                height: 1,
                ..
            } => Some(*id),
            _ => None,
        })
        .last()
        .expect("placeholder created");
    device.clear_calls();

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    batch.draw(&device, None, &SpriteDesc::default()).unwrap();
    batch.end(&device).unwrap();

    assert_eq!(device.count_draw_calls(), 1);
    assert_eq!(device.texture_binds(), vec![(0, placeholder_id)]);
}

#[test]
fn empty_session_issues_no_draws() {
    let device = MockDevice::new();
    let (mut batch, _effects) = make_batch(&device, false);
    device.clear_calls();

    batch
        .begin(&device, PassTarget::Surface, &BatchOptions::default())
        .unwrap();
    batch.end(&device).unwrap();

    assert_eq!(device.count_draw_calls(), 0);
    assert_eq!(device.count_passes(), 1);
}
