//! Frame lifecycle, draw ordering, composition, and resize behavior.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember_render::{
    CameraInfo, EffectDesc, FrameError, Material, MeshData, MeshVertex, Renderable, Renderer,
    RendererDesc, SceneDraw, SpriteDesc, StrategyKind, Texture2D,
};
use ember_test_utils::{DeviceCall, MockDevice, TextureFormat};

fn make_renderer(strategy: StrategyKind) -> (Arc<MockDevice>, Renderer) {
    let device = Arc::new(MockDevice::new());
    let renderer = Renderer::new(
        device.clone(),
        &RendererDesc {
            strategy,
            ..Default::default()
        },
    );
    (device, renderer)
}

fn make_material(device: &MockDevice, renderer: &mut Renderer, translucent: bool) -> Arc<Material> {
    let effect = renderer.effects_mut().get_or_create(
        device,
        &EffectDesc {
            label: "scene_material",
            vertex_source: "// scene shader",
            fragment_source: "// scene shader",
            defines: &[],
            vertex_stride: 32,
            vertex_attributes: &[],
        },
    );
    Arc::new(Material::new(effect).with_translucency(translucent))
}

/// A renderable whose index count identifies it in the mock's draw log.
fn make_renderable(device: &MockDevice, material: Arc<Material>, index_count: usize) -> Renderable {
    let vertices = [MeshVertex {
        position: [0.0; 3],
        normal: [0.0, 1.0, 0.0],
        texcoord: [0.0; 2],
    }];
    let indices = vec![0u32; index_count];
    Renderable::new(
        device,
        "mesh",
        &MeshData {
            vertices: &vertices,
            indices: &indices,
        },
        material,
    )
}

fn at_distance(z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 0.0, z))
}

#[test]
fn frame_state_machine_rejects_out_of_order_calls() {
    let (_device, mut renderer) = make_renderer(StrategyKind::Forward);
    let camera = CameraInfo::default();

    assert_eq!(renderer.end_frame(), Err(FrameError::FrameNotOpen));
    assert_eq!(renderer.perform_2d_pass(), Err(FrameError::FrameNotOpen));
    assert_eq!(
        renderer.perform_3d_pass(&camera, &[]),
        Err(FrameError::FrameNotOpen)
    );

    renderer.new_frame().unwrap();
    assert_eq!(renderer.new_frame(), Err(FrameError::FrameAlreadyOpen));

    renderer.perform_2d_pass().unwrap();
    // The 3D pass must fully complete before the 2D phase.
    assert_eq!(
        renderer.perform_3d_pass(&camera, &[]),
        Err(FrameError::SceneAfterOverlay)
    );

    renderer.end_frame().unwrap();
    assert_eq!(renderer.end_frame(), Err(FrameError::FrameNotOpen));
}

#[test]
fn opaque_draws_sort_front_to_back() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let material = make_material(&device, &mut renderer, false);

    // Index counts 30/6/12 tag the renderables at distances 5/1/3.
    let far = make_renderable(&device, material.clone(), 30);
    let near = make_renderable(&device, material.clone(), 6);
    let mid = make_renderable(&device, material.clone(), 12);

    renderer.new_frame().unwrap();
    device.clear_calls();
    renderer
        .perform_3d_pass(
            &CameraInfo::default(),
            &[
                SceneDraw {
                    renderable: &far,
                    world: at_distance(5.0),
                },
                SceneDraw {
                    renderable: &near,
                    world: at_distance(1.0),
                },
                SceneDraw {
                    renderable: &mid,
                    world: at_distance(3.0),
                },
            ],
        )
        .unwrap();

    // Distances {5, 1, 3} drawn as {1, 3, 5}.
    assert_eq!(device.draw_index_counts(), vec![6, 12, 30]);
    renderer.end_frame().unwrap();
}

#[test]
fn translucent_draws_sort_back_to_front() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let material = make_material(&device, &mut renderer, true);

    let far = make_renderable(&device, material.clone(), 30);
    let near = make_renderable(&device, material.clone(), 6);
    let mid = make_renderable(&device, material.clone(), 12);

    renderer.new_frame().unwrap();
    device.clear_calls();
    renderer
        .perform_3d_pass(
            &CameraInfo::default(),
            &[
                SceneDraw {
                    renderable: &far,
                    world: at_distance(5.0),
                },
                SceneDraw {
                    renderable: &near,
                    world: at_distance(1.0),
                },
                SceneDraw {
                    renderable: &mid,
                    world: at_distance(3.0),
                },
            ],
        )
        .unwrap();

    // Distances {5, 1, 3} drawn as {5, 3, 1}.
    assert_eq!(device.draw_index_counts(), vec![30, 12, 6]);
    renderer.end_frame().unwrap();
}

#[test]
fn opaque_before_translucent_with_stable_ties() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let opaque = make_material(&device, &mut renderer, false);
    let translucent = make_material(&device, &mut renderer, true);

    let glass = make_renderable(&device, translucent, 6);
    let wall_a = make_renderable(&device, opaque.clone(), 12);
    let wall_b = make_renderable(&device, opaque, 18);

    renderer.new_frame().unwrap();
    device.clear_calls();
    // Both walls at the same distance: submission order must hold.
    renderer
        .perform_3d_pass(
            &CameraInfo::default(),
            &[
                SceneDraw {
                    renderable: &glass,
                    world: at_distance(2.0),
                },
                SceneDraw {
                    renderable: &wall_a,
                    world: at_distance(4.0),
                },
                SceneDraw {
                    renderable: &wall_b,
                    world: at_distance(4.0),
                },
            ],
        )
        .unwrap();

    assert_eq!(device.draw_index_counts(), vec![12, 18, 6]);
    renderer.end_frame().unwrap();
}

#[test]
fn sprites_draw_in_depth_order_with_stable_ties() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let make_texture = |w: u32| {
        let bytes = vec![0u8; (w * w * 4) as usize];
        Texture2D::from_pixels(
            &*device,
            "sprite",
            &ember_render::PixelData {
                width: w,
                height: w,
                format: TextureFormat::Rgba8UnormSrgb,
                bytes: &bytes,
            },
        )
        .unwrap()
    };
    let texture_a = make_texture(8);
    let texture_b = make_texture(8);
    let texture_c = make_texture(8);

    renderer.new_frame().unwrap();
    renderer.queue_sprite(Some(&texture_a), SpriteDesc::default(), 2.0);
    renderer.queue_sprite(Some(&texture_b), SpriteDesc::default(), 1.0);
    renderer.queue_sprite(Some(&texture_c), SpriteDesc::default(), 1.0);
    device.clear_calls();
    renderer.perform_2d_pass().unwrap();

    // Ascending depth; equal keys keep queueing order.
    let binds: Vec<u64> = device.texture_binds().iter().map(|(_, id)| *id).collect();
    assert_eq!(binds, vec![texture_b.id(), texture_c.id(), texture_a.id()]);
    renderer.end_frame().unwrap();
}

#[test]
fn end_frame_composites_main_target_and_presents() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let main_color_id = renderer.main_target().color_texture().id();

    renderer.new_frame().unwrap();
    device.clear_calls();
    renderer.end_frame().unwrap();

    // One full-target sprite, then present.
    assert_eq!(device.draw_index_counts(), vec![6]);
    assert_eq!(device.texture_binds(), vec![(0, main_color_id)]);
    let calls = device.calls();
    assert_eq!(calls.last(), Some(&DeviceCall::EndFrame));
}

#[test]
fn resize_round_trip_recreates_main_target_once_per_call() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let original = renderer.main_target().size();
    device.clear_calls();

    renderer.resize(640, 480).unwrap();
    assert_eq!(device.count_framebuffer_destroys(), 1);
    assert_eq!(device.count_framebuffer_creates(), 1);
    assert_eq!(renderer.main_target().size(), (640, 480));

    renderer.resize(original.0, original.1).unwrap();
    assert_eq!(device.count_framebuffer_destroys(), 2);
    assert_eq!(device.count_framebuffer_creates(), 2);
    assert_eq!(renderer.main_target().size(), original);

    // Same-size resize is a no-op.
    renderer.resize(original.0, original.1).unwrap();
    assert_eq!(device.count_framebuffer_destroys(), 2);
}

#[test]
fn resize_mid_frame_is_rejected() {
    let (_device, mut renderer) = make_renderer(StrategyKind::Forward);
    renderer.new_frame().unwrap();
    assert_eq!(renderer.resize(640, 480), Err(FrameError::ResizeDuringFrame));
    renderer.end_frame().unwrap();
}

#[test]
fn deferred_resize_recreates_gbuffer_too() {
    let (device, mut renderer) = make_renderer(StrategyKind::Deferred);
    device.clear_calls();

    renderer.resize(640, 480).unwrap();
    // Main target and G-buffer both follow the surface size.
    assert_eq!(device.count_framebuffer_destroys(), 2);
    assert_eq!(device.count_framebuffer_creates(), 2);
}

#[test]
fn deferred_pass_populates_gbuffer_then_resolves() {
    let (device, mut renderer) = make_renderer(StrategyKind::Deferred);
    let material = make_material(&device, &mut renderer, false);
    let mesh = make_renderable(&device, material, 12);

    renderer.new_frame().unwrap();
    device.clear_calls();
    renderer
        .perform_3d_pass(
            &CameraInfo::default(),
            &[SceneDraw {
                renderable: &mesh,
                world: at_distance(2.0),
            }],
        )
        .unwrap();

    // Geometry into the G-buffer, then the fullscreen resolve.
    assert_eq!(device.count_passes(), 2);
    assert_eq!(device.draw_index_counts(), vec![12, 3]);
    renderer.end_frame().unwrap();
}

#[test]
fn dispose_releases_owned_resources() {
    let (device, renderer) = make_renderer(StrategyKind::Forward);
    device.clear_calls();
    renderer.dispose();

    // Sprite batch vertex/index/uniform buffers, forward frame uniforms,
    // and the object ring.
    assert_eq!(device.count_buffer_destroys(), 5);
    // The main target is the only framebuffer the forward renderer owns.
    assert_eq!(device.count_framebuffer_destroys(), 1);
    // Sprite and forward effects both released their last reference.
    assert_eq!(device.count_shader_destroys(), 2);
}

#[test]
fn frame_stats_track_submissions() {
    let (device, mut renderer) = make_renderer(StrategyKind::Forward);
    let material = make_material(&device, &mut renderer, false);
    let mesh = make_renderable(&device, material, 6);
    let bytes = vec![0u8; 4 * 4 * 4];
    let texture = Texture2D::from_pixels(
        &*device,
        "hud",
        &ember_render::PixelData {
            width: 4,
            height: 4,
            format: TextureFormat::Rgba8UnormSrgb,
            bytes: &bytes,
        },
    )
    .unwrap();

    renderer.new_frame().unwrap();
    renderer
        .perform_3d_pass(
            &CameraInfo::default(),
            &[SceneDraw {
                renderable: &mesh,
                world: at_distance(1.0),
            }],
        )
        .unwrap();
    renderer.queue_sprite(Some(&texture), SpriteDesc::default(), 0.0);
    renderer.queue_sprite(Some(&texture), SpriteDesc::default(), 0.0);
    renderer.perform_2d_pass().unwrap();
    renderer.end_frame().unwrap();

    let stats = renderer.stats();
    assert_eq!(stats.renderables, 1);
    assert_eq!(stats.sprites, 2);
    assert_eq!(stats.sprite_flushes, 1);
}
