//! wgpu Backend Smoke Tests
//!
//! Runs full frames through `WgpuDevice` + `WgpuProgram` to catch pipeline
//! creation and binding validation errors. Needs a real adapter, so every
//! test is ignored by default:
//!
//! ```text
//! cargo test --test gpu_smoke_tests -- --ignored
//! ```

use glam::{Mat4, Vec3};

use sslr::backend::{WgpuDevice, WgpuProgram};
use sslr::{CameraState, FilterMode, QualityTier, ScreenSpaceReflection, SslrSettings, TextureId};

fn device() -> WgpuDevice {
    let _ = env_logger::builder().is_test(true).try_init();
    pollster::block_on(WgpuDevice::request(wgpu::PowerPreference::LowPower))
        .expect("no GPU adapter available")
}

fn host_texture(
    device: &mut WgpuDevice,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> TextureId {
    host_texture_with_filter(device, label, width, height, format, usage, FilterMode::Bilinear)
}

fn host_texture_with_filter(
    device: &mut WgpuDevice,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    filter: FilterMode,
) -> TextureId {
    let texture = device.device().create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    device.import_texture_with_filter(texture, filter)
}

struct Targets {
    color: TextureId,
    depth: TextureId,
    destination: TextureId,
}

fn targets(device: &mut WgpuDevice, width: u32, height: u32) -> Targets {
    let sampled = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
    let color = host_texture(
        device,
        "Scene Color",
        width,
        height,
        wgpu::TextureFormat::Rgba16Float,
        sampled | wgpu::TextureUsages::RENDER_ATTACHMENT,
    );
    let depth = host_texture(
        device,
        "Scene Depth",
        width,
        height,
        wgpu::TextureFormat::Depth32Float,
        sampled | wgpu::TextureUsages::RENDER_ATTACHMENT,
    );
    let destination = host_texture(
        device,
        "Destination",
        width,
        height,
        wgpu::TextureFormat::Rgba16Float,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
    );
    Targets {
        color,
        depth,
        destination,
    }
}

fn camera(width: u32, height: u32) -> CameraState {
    CameraState::new(
        Mat4::look_at_rh(Vec3::new(0.0, 1.0, 2.0), Vec3::new(0.0, 1.0, -5.0), Vec3::Y),
        Mat4::perspective_rh(60f32.to_radians(), width as f32 / height as f32, 0.1, 100.0),
        width,
        height,
    )
}

#[test]
#[ignore = "requires a GPU adapter"]
fn every_quality_tier_renders_a_frame() {
    let mut device = device();
    let t = targets(&mut device, 128, 72);
    let program = WgpuProgram::new(&device).unwrap();
    let mut effect = ScreenSpaceReflection::with_program(SslrSettings::default(), program);

    for quality in QualityTier::ALL {
        effect.settings_mut().set_quality(quality);
        let out = effect
            .process(&mut device, t.color, t.depth, &camera(128, 72), t.destination)
            .unwrap();
        assert_eq!(out, t.destination);
    }
    assert_eq!(effect.stats().pass_failures, 0);
    assert_eq!(effect.program().unwrap().pipeline_count(), 6);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn smoothness_path_renders_and_tears_down() {
    let mut device = device();
    let t = targets(&mut device, 96, 64);
    let mut settings = SslrSettings::default();
    settings.set_smoothness_enabled(true);
    settings.set_blur_sample_count(0);
    let program = WgpuProgram::new(&device).unwrap();
    let mut effect = ScreenSpaceReflection::with_program(settings, program);

    for _ in 0..3 {
        effect
            .process(&mut device, t.color, t.depth, &camera(96, 64), t.destination)
            .unwrap();
    }
    assert_eq!(effect.pool().outstanding(), 0);

    effect.teardown(&mut device);
    // Imported host textures survive the teardown.
    assert!(device.get(t.color).is_some());
    assert!(device.get(t.destination).is_some());
}

#[test]
#[ignore = "requires a GPU adapter"]
fn float_depth_source_renders_a_frame() {
    let mut device = device();
    let mut t = targets(&mut device, 64, 48);
    t.depth = host_texture(
        &mut device,
        "Scene Depth (R32Float)",
        64,
        48,
        wgpu::TextureFormat::R32Float,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    let far: Vec<u8> = std::iter::repeat_n(1.0f32.to_le_bytes(), 64 * 48)
        .flatten()
        .collect();
    device.write_texture(t.depth, &far).unwrap();

    let program = WgpuProgram::new(&device).unwrap();
    let mut effect = ScreenSpaceReflection::with_program(SslrSettings::default(), program);
    let out = effect
        .process(&mut device, t.color, t.depth, &camera(64, 48), t.destination)
        .unwrap();

    assert_eq!(out, t.destination);
    assert_eq!(effect.stats().pass_failures, 0);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn nearest_filtered_source_renders_a_frame() {
    let mut device = device();
    let mut t = targets(&mut device, 64, 48);
    t.color = host_texture_with_filter(
        &mut device,
        "Scene Color (Nearest)",
        64,
        48,
        wgpu::TextureFormat::Rgba16Float,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        FilterMode::Nearest,
    );
    assert_eq!(device.get(t.color).unwrap().filter(), FilterMode::Nearest);

    let program = WgpuProgram::new(&device).unwrap();
    let mut effect = ScreenSpaceReflection::with_program(SslrSettings::default(), program);
    for _ in 0..2 {
        let out = effect
            .process(&mut device, t.color, t.depth, &camera(64, 48), t.destination)
            .unwrap();
        assert_eq!(out, t.destination);
    }
    assert_eq!(effect.stats().pass_failures, 0);
}
