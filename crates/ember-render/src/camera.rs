//! Per-frame camera and lighting payloads.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use static_assertions::const_assert_eq;

use crate::color::Color;

/// Camera and scene-lighting information supplied by the host once per pass.
///
/// Nothing here persists between frames beyond the uniform buffers the
/// strategies upload it into.
#[derive(Debug, Clone, Copy)]
pub struct CameraInfo {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub light_direction: Vec3,
    pub light_color: Color,
    pub ambient: f32,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            light_direction: Vec3::new(0.0, -1.0, 0.0),
            light_color: Color::WHITE,
            ambient: 0.1,
        }
    }
}

impl CameraInfo {
    /// Combined projection x view matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Per-pass uniform block: camera matrices and the scene light.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// xyz = camera position, w unused.
    pub camera_pos: [f32; 4],
    /// xyz = light direction, w = ambient intensity.
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<FrameUniforms>(), 112);

impl FrameUniforms {
    pub fn from_camera(camera: &CameraInfo) -> Self {
        Self {
            view_proj: camera.view_projection().to_cols_array_2d(),
            camera_pos: [camera.position.x, camera.position.y, camera.position.z, 0.0],
            light_dir: [
                camera.light_direction.x,
                camera.light_direction.y,
                camera.light_direction.z,
                camera.ambient,
            ],
            light_color: camera.light_color.to_array(),
        }
    }
}

/// Per-object uniform block: world transform and material scalars.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub world: [[f32; 4]; 4],
    pub tint: [f32; 4],
    /// x = uv tiling, yzw unused.
    pub params: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<ObjectUniforms>(), 96);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_uniforms_carry_ambient_in_light_dir_w() {
        let camera = CameraInfo {
            ambient: 0.25,
            ..Default::default()
        };
        let uniforms = FrameUniforms::from_camera(&camera);
        assert_eq!(uniforms.light_dir[3], 0.25);
    }

    #[test]
    fn view_projection_order() {
        let camera = CameraInfo {
            view: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            projection: Mat4::from_scale(Vec3::splat(2.0)),
            ..Default::default()
        };
        let vp = camera.view_projection();
        let p = vp.transform_point3(Vec3::ZERO);
        // Translation applied first (view), then scaled by the projection.
        assert_eq!(p, Vec3::new(2.0, 0.0, 0.0));
    }
}
