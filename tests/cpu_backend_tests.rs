//! CPU Reference Backend Tests
//!
//! Tests for:
//! - Temporal accumulation: blend ratio extremes, convergence under a static camera
//! - Composite: `src + reflection * alpha * enhancer`, source alpha preserved
//! - Separable blur: box weights, radius and offset
//! - Raytrace: floor/wall scene reflects the wall, empty depth reflects nothing

use glam::{Mat4, Vec2, Vec3, Vec4};

use sslr::backend::{CpuDevice, CpuProgram};
use sslr::program::{BlurAxis, BlurParams, BlurPurpose, RaytraceParams};
use sslr::{
    CameraState, PassInvocation, QualityTier, RenderDevice, ScreenSpaceReflection, ShadingProgram,
    SslrSettings, TextureFormat, TextureId,
};

const EPSILON: f32 = 1e-4;

fn approx_vec4(a: Vec4, b: Vec4) -> bool {
    (a - b).abs().max_element() < EPSILON
}

// ============================================================================
// Fixtures
// ============================================================================

struct Images {
    color: TextureId,
    depth: TextureId,
    destination: TextureId,
}

fn images(device: &mut CpuDevice, width: u32, height: u32, color: Vec4) -> Images {
    let images = Images {
        color: device
            .create_image("Scene Color", width, height, TextureFormat::Rgba16Float)
            .unwrap(),
        depth: device
            .create_image("Scene Depth", width, height, TextureFormat::Depth32Float)
            .unwrap(),
        destination: device
            .create_image("Destination", width, height, TextureFormat::Rgba16Float)
            .unwrap(),
    };
    device.fill(images.color, |_, _| color).unwrap();
    device.clear_texture(images.depth, [1.0; 4]).unwrap();
    images
}

fn static_camera(width: u32, height: u32) -> CameraState {
    CameraState::new(
        Mat4::look_at_rh(Vec3::new(0.0, 1.0, 2.0), Vec3::new(0.0, 1.0, -5.0), Vec3::Y),
        Mat4::perspective_rh(60f32.to_radians(), width as f32 / height as f32, 0.1, 100.0),
        width,
        height,
    )
}

/// Settings isolating the temporal blend: full resolution, no blurs.
fn accumulation_settings(ratio: f32) -> SslrSettings {
    let mut settings = SslrSettings::default();
    settings.set_resolution_scale(1.0);
    settings.set_blur_sample_count(0);
    settings.set_accumulation_blend_ratio(ratio);
    settings
}

fn constant_reflection(value: Vec4) -> CpuProgram {
    CpuProgram::new().with_raytrace(move |_| value)
}

// ============================================================================
// Accumulation Tests
// ============================================================================

#[test]
fn blend_ratio_one_takes_the_current_reflection() {
    let mut device = CpuDevice::new();
    let img = images(&mut device, 16, 8, Vec4::ZERO);
    let camera = static_camera(16, 8);
    let reflection = Vec4::new(0.3, 0.6, 0.9, 1.0);
    let mut effect = ScreenSpaceReflection::with_program(
        accumulation_settings(1.0),
        constant_reflection(reflection),
    );

    effect
        .process(&mut device, img.color, img.depth, &camera, img.destination)
        .unwrap();

    let accumulated = effect.last_report().unwrap().accumulated;
    for (x, y) in [(0, 0), (7, 3), (15, 7)] {
        assert!(approx_vec4(device.pixel(accumulated, x, y).unwrap(), reflection));
    }
}

#[test]
fn blend_ratio_zero_keeps_the_history() {
    let mut device = CpuDevice::new();
    let img = images(&mut device, 16, 8, Vec4::ZERO);
    let camera = static_camera(16, 8);
    let mut effect =
        ScreenSpaceReflection::with_program(accumulation_settings(0.0), constant_reflection(Vec4::ONE));

    for _ in 0..3 {
        effect
            .process(&mut device, img.color, img.depth, &camera, img.destination)
            .unwrap();
    }

    let accumulated = effect.last_report().unwrap().accumulated;
    assert!(device.pixels(accumulated).unwrap().iter().all(|p| *p == Vec4::ZERO));
}

#[test]
fn static_camera_converges_geometrically() {
    const FRAMES: i32 = 10;
    let (width, height) = (256, 144);
    let mut device = CpuDevice::new();
    let img = images(&mut device, width, height, Vec4::ZERO);
    let camera = static_camera(width, height);
    let reflection = Vec4::new(0.8, 0.4, 0.2, 1.0);
    let mut effect = ScreenSpaceReflection::with_program(
        accumulation_settings(0.1),
        constant_reflection(reflection),
    );

    for _ in 0..FRAMES {
        effect
            .process(&mut device, img.color, img.depth, &camera, img.destination)
            .unwrap();
    }

    // history_n = r * (1 - 0.9^n) starting from a zeroed buffer
    let expected = reflection * (1.0 - 0.9f32.powi(FRAMES));
    let accumulated = effect.last_report().unwrap().accumulated;
    for (x, y) in [(0, 0), (128, 72), (255, 143), (31, 100)] {
        let texel = device.pixel(accumulated, x, y).unwrap();
        assert!(approx_vec4(texel, expected), "({x}, {y}): {texel:?} vs {expected:?}");
    }
}

#[test]
fn moving_camera_reprojects_history() {
    let mut device = CpuDevice::new();
    let img = images(&mut device, 32, 16, Vec4::ZERO);
    // A wall facing the camera at z = -5.
    let first = static_camera(32, 16);
    let wall_depth = first.projection.project_point3(Vec3::new(0.0, 0.0, -7.0)).z;
    device.clear_texture(img.depth, [wall_depth; 4]).unwrap();

    let mut effect = ScreenSpaceReflection::with_program(
        accumulation_settings(1.0),
        constant_reflection(Vec4::ONE),
    );
    effect
        .process(&mut device, img.color, img.depth, &first, img.destination)
        .unwrap();

    // Half of the reprojected history, half a black reflection.
    effect.settings_mut().set_accumulation_blend_ratio(0.5);
    effect.bind_program(constant_reflection(Vec4::ZERO));
    let moved = CameraState::new(
        Mat4::look_at_rh(Vec3::new(0.1, 1.0, 2.0), Vec3::new(0.1, 1.0, -5.0), Vec3::Y),
        first.projection,
        32,
        16,
    );
    effect
        .process(&mut device, img.color, img.depth, &moved, img.destination)
        .unwrap();

    let accumulated = effect.last_report().unwrap().accumulated;
    let center = device.pixel(accumulated, 16, 8).unwrap();
    assert!(approx_vec4(center, Vec4::splat(0.5)), "{center:?}");
}

// ============================================================================
// Composite Tests
// ============================================================================

#[test]
fn composite_adds_weighted_reflection() {
    let mut device = CpuDevice::new();
    let source = Vec4::new(0.2, 0.3, 0.4, 0.5);
    let img = images(&mut device, 32, 16, source);
    let camera = static_camera(32, 16);
    let mut settings = accumulation_settings(1.0);
    settings.set_resolution_scale(0.5);
    settings.set_reflection_enhancer(2.0);
    let mut effect =
        ScreenSpaceReflection::with_program(settings, constant_reflection(Vec4::splat(0.5)));

    let out = effect
        .process(&mut device, img.color, img.depth, &camera, img.destination)
        .unwrap();

    // src + refl.rgb * refl.a * enhancer = src + 0.5 * 0.5 * 2
    let expected = Vec4::new(0.7, 0.8, 0.9, 0.5);
    for (x, y) in [(0, 0), (16, 8), (31, 15)] {
        assert!(approx_vec4(device.pixel(out, x, y).unwrap(), expected));
    }
}

#[test]
fn zero_enhancer_leaves_source_untouched() {
    let mut device = CpuDevice::new();
    let source = Vec4::new(0.25, 0.5, 0.75, 1.0);
    let img = images(&mut device, 16, 16, source);
    let camera = static_camera(16, 16);
    let mut settings = accumulation_settings(1.0);
    settings.set_reflection_enhancer(0.0);
    let mut effect = ScreenSpaceReflection::with_program(settings, constant_reflection(Vec4::ONE));

    let out = effect
        .process(&mut device, img.color, img.depth, &camera, img.destination)
        .unwrap();

    assert!(device.pixels(out).unwrap().iter().all(|p| approx_vec4(*p, source)));
}

// ============================================================================
// Blur Tests
// ============================================================================

fn run_blur(device: &mut CpuDevice, input: TextureId, output: TextureId, offset: Vec2, radius: u32) {
    let mut program = CpuProgram::new();
    program
        .run_pass(
            device,
            &PassInvocation::Blur(BlurParams {
                input,
                output,
                axis: BlurAxis::Horizontal,
                offset,
                radius,
                purpose: BlurPurpose::Denoise,
            }),
        )
        .unwrap();
}

#[test]
fn horizontal_blur_spreads_an_impulse_evenly() {
    let mut device = CpuDevice::new();
    let input = device
        .create_image("Impulse", 7, 1, TextureFormat::Rgba16Float)
        .unwrap();
    let output = device
        .create_image("Blurred", 7, 1, TextureFormat::Rgba16Float)
        .unwrap();
    device
        .fill(input, |x, _| if x == 3 { Vec4::ONE } else { Vec4::ZERO })
        .unwrap();

    run_blur(&mut device, input, output, Vec2::X, 1);

    let third = Vec4::splat(1.0 / 3.0);
    assert!(approx_vec4(device.pixel(output, 2, 0).unwrap(), third));
    assert!(approx_vec4(device.pixel(output, 3, 0).unwrap(), third));
    assert!(approx_vec4(device.pixel(output, 4, 0).unwrap(), third));
    assert!(approx_vec4(device.pixel(output, 1, 0).unwrap(), Vec4::ZERO));
    assert!(approx_vec4(device.pixel(output, 5, 0).unwrap(), Vec4::ZERO));
}

#[test]
fn blur_offset_scales_the_tap_spacing() {
    let mut device = CpuDevice::new();
    let input = device
        .create_image("Impulse", 9, 1, TextureFormat::Rgba16Float)
        .unwrap();
    let output = device
        .create_image("Blurred", 9, 1, TextureFormat::Rgba16Float)
        .unwrap();
    device
        .fill(input, |x, _| if x == 4 { Vec4::ONE } else { Vec4::ZERO })
        .unwrap();

    run_blur(&mut device, input, output, Vec2::new(2.0, 0.0), 1);

    let third = Vec4::splat(1.0 / 3.0);
    assert!(approx_vec4(device.pixel(output, 2, 0).unwrap(), third));
    assert!(approx_vec4(device.pixel(output, 6, 0).unwrap(), third));
    assert!(approx_vec4(device.pixel(output, 3, 0).unwrap(), Vec4::ZERO));
}

#[test]
fn vertical_offset_does_not_blur_horizontally() {
    let mut device = CpuDevice::new();
    let input = device
        .create_image("Impulse", 5, 5, TextureFormat::Rgba16Float)
        .unwrap();
    let output = device
        .create_image("Blurred", 5, 5, TextureFormat::Rgba16Float)
        .unwrap();
    device
        .fill(input, |x, y| if (x, y) == (2, 2) { Vec4::ONE } else { Vec4::ZERO })
        .unwrap();

    run_blur(&mut device, input, output, Vec2::Y, 2);

    assert!(approx_vec4(device.pixel(output, 2, 0).unwrap(), Vec4::splat(0.2)));
    assert!(approx_vec4(device.pixel(output, 1, 2).unwrap(), Vec4::ZERO));
}

// ============================================================================
// Raytrace Tests
// ============================================================================

const WALL_Z: f32 = -5.0;
const WALL_COLOR: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const FLOOR_COLOR: Vec4 = Vec4::new(0.2, 0.2, 0.2, 1.0);

/// Depth and color of a floor at `y = 0` meeting a wall at `z = -5`.
fn floor_and_wall(device: &mut CpuDevice, camera: &CameraState, img: &Images) {
    let (width, height) = (camera.pixel_width, camera.pixel_height);
    let inv = camera.inverse_view_projection();
    let vp = camera.view_projection();
    let eye = camera.view.inverse().transform_point3(Vec3::ZERO);

    let surface = |x: u32, y: u32| -> Option<(f32, bool)> {
        let ndc = Vec2::new(
            (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
        );
        let far = inv.project_point3(ndc.extend(1.0));
        let dir = (far - eye).normalize();

        let t_floor = (dir.y < 0.0).then(|| -eye.y / dir.y);
        let t_wall = (dir.z < 0.0).then(|| (WALL_Z - eye.z) / dir.z);
        let (t, is_wall) = match (t_floor, t_wall) {
            (Some(f), Some(w)) if w < f => (w, true),
            (Some(f), _) => (f, false),
            (None, Some(w)) => (w, true),
            (None, None) => return None,
        };
        Some((vp.project_point3(eye + dir * t).z, is_wall))
    };

    device
        .fill(img.depth, |x, y| Vec4::splat(surface(x, y).map_or(1.0, |(d, _)| d)))
        .unwrap();
    device
        .fill(img.color, |x, y| match surface(x, y) {
            Some((_, true)) => WALL_COLOR,
            Some((_, false)) => FLOOR_COLOR,
            None => Vec4::ZERO,
        })
        .unwrap();
}

fn raytrace(
    device: &mut CpuDevice,
    camera: &CameraState,
    img: &Images,
    ray_max_length: f32,
) -> TextureId {
    let output = device
        .create_image(
            "Reflection",
            camera.pixel_width,
            camera.pixel_height,
            TextureFormat::Rgba8Unorm,
        )
        .unwrap();
    let mut program = CpuProgram::new();
    program
        .run_pass(
            device,
            &PassInvocation::Raytrace(RaytraceParams {
                source_color: img.color,
                source_depth: img.depth,
                view_projection: camera.view_projection(),
                inverse_view_projection: camera.inverse_view_projection(),
                ray_max_length,
                ray_max_thickness: 0.2,
                quality: QualityTier::High,
                output,
            }),
        )
        .unwrap();
    output
}

/// Texel covering the world position `p`.
fn texel_of(camera: &CameraState, p: Vec3) -> (u32, u32) {
    let ndc = camera.view_projection().project_point3(p);
    let u = ndc.x * 0.5 + 0.5;
    let v = 0.5 - ndc.y * 0.5;
    (
        (u * camera.pixel_width as f32) as u32,
        (v * camera.pixel_height as f32) as u32,
    )
}

#[test]
fn floor_reflects_the_wall() {
    let mut device = CpuDevice::new();
    let camera = static_camera(256, 144);
    let img = images(&mut device, 256, 144, Vec4::ZERO);
    floor_and_wall(&mut device, &camera, &img);

    let reflection = raytrace(&mut device, &camera, &img, 3.0);

    let (x, y) = texel_of(&camera, Vec3::new(0.0, 0.0, -4.0));
    let texel = device.pixel(reflection, x, y).unwrap();
    assert!(texel.w > 0.0, "expected a hit, got {texel:?}");
    assert!(texel.x > 0.5, "expected wall color, got {texel:?}");
    assert!(texel.y < 0.2 && texel.z < 0.2, "expected wall color, got {texel:?}");
}

#[test]
fn short_rays_miss_the_wall() {
    let mut device = CpuDevice::new();
    let camera = static_camera(256, 144);
    let img = images(&mut device, 256, 144, Vec4::ZERO);
    floor_and_wall(&mut device, &camera, &img);

    let reflection = raytrace(&mut device, &camera, &img, 0.1);

    let (x, y) = texel_of(&camera, Vec3::new(0.0, 0.0, -4.0));
    assert_eq!(device.pixel(reflection, x, y), Some(Vec4::ZERO));
}

#[test]
fn empty_depth_reflects_nothing() {
    let mut device = CpuDevice::new();
    let camera = static_camera(64, 36);
    let img = images(&mut device, 64, 36, Vec4::ONE);

    let reflection = raytrace(&mut device, &camera, &img, 3.0);

    assert!(device.pixels(reflection).unwrap().iter().all(|p| *p == Vec4::ZERO));
}
