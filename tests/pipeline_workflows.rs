//! End-to-end workflows: upload, segment, compose, export

mod common;

use bg_composer::{
    background::{render_fill, BLUE_GRADIENT},
    compositor,
    segmentation::segment,
    BackgroundSpec, Color, ComposerConfig, CustomAsset, DragGesture, EditingSession,
    ImageLoader, PlacementState, SegmentationSource,
    SourceImage,
};
use common::{encode_png, framed_subject, framed_subject_png, BACKGROUND, SUBJECT};
use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn offline_config(dir: &TempDir) -> ComposerConfig {
    ComposerConfig::builder()
        .no_remote()
        .output_dir(dir.path())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_white_background_export_is_fully_opaque() {
    let dir = TempDir::new().unwrap();
    let mut session = EditingSession::new(&offline_config(&dir)).unwrap();

    session.upload(&framed_subject_png()).unwrap();
    let layer = session.remove_background().await.unwrap();
    assert_eq!(layer.source(), SegmentationSource::Local);

    session.set_background(BackgroundSpec::Solid(Color::WHITE));
    let artifact = session.export().await.unwrap();

    assert!(artifact.filename.starts_with("bg-removed-"));
    assert!(artifact.filename.ends_with(".png"));
    let stamp = &artifact.filename["bg-removed-".len()..artifact.filename.len() - 4];
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));

    let path = artifact.path.unwrap();
    assert_eq!(path.parent().unwrap(), dir.path());
    let exported = image::open(&path).unwrap().to_rgba8();
    assert_eq!(exported.dimensions(), (56, 42));
    assert!(exported.pixels().all(|p| p[3] == 255));
}

#[tokio::test]
async fn test_transparent_background_keeps_alpha() {
    let dir = TempDir::new().unwrap();
    let mut session = EditingSession::new(&offline_config(&dir)).unwrap();
    session.upload(&framed_subject_png()).unwrap();
    session.remove_background().await.unwrap();

    let artifact = session.export().await.unwrap();
    let exported = image::open(artifact.path.unwrap()).unwrap().to_rgba8();

    // 56x42 surface, 15x11 rectangle at (20, 23)
    assert_eq!(exported.get_pixel(0, 0)[3], 0);
    assert_eq!(exported.get_pixel(55, 41)[3], 0);
    let center = exported.get_pixel(27, 28);
    assert_eq!(center[3], 255);
    for (got, want) in center.0.iter().zip(SUBJECT.iter()).take(3) {
        assert!(got.abs_diff(*want) <= 2, "{:?}", center);
    }
}

#[tokio::test]
async fn test_custom_background_sets_surface_size() {
    let dir = TempDir::new().unwrap();
    let bg_path = dir.path().join("beach.png");
    std::fs::write(
        &bg_path,
        encode_png(&RgbaImage::from_pixel(64, 48, Rgba([10, 200, 120, 255]))),
    )
    .unwrap();

    let mut session = EditingSession::new(&offline_config(&dir)).unwrap();
    session.upload(&framed_subject_png()).unwrap();
    session.remove_background().await.unwrap();
    session.set_background(BackgroundSpec::Custom(CustomAsset::from_path(&bg_path).unwrap()));
    session.update_placement(PlacementState::default().with_rotation(30.0).with_flip(true, false));

    let artifact = session.export().await.unwrap();
    assert_eq!(artifact.dimensions, (64, 48));
    let exported = image::open(artifact.path.unwrap()).unwrap().to_rgba8();
    assert!(exported.pixels().all(|p| p[3] == 255));
    assert_eq!(exported.get_pixel(1, 1).0, [10, 200, 120, 255]);
}

#[tokio::test]
async fn test_data_url_background_parses_as_custom() {
    let png = encode_png(&RgbaImage::from_pixel(9, 7, Rgba([1, 2, 3, 255])));
    let url = bg_composer::utils::data_url::encode("image/png", &png);
    let spec: BackgroundSpec = url.parse().unwrap();
    assert!(matches!(spec, BackgroundSpec::Custom(_)));
}

#[test]
fn test_gradient_surface_has_no_transparent_pixels() {
    let (start, end) = BLUE_GRADIENT;
    let surface = render_fill(&BackgroundSpec::Gradient(start, end), (50, 30)).unwrap();
    let (w, h) = surface.dimensions();
    assert_eq!((w, h), (70, 42));
    assert_eq!(surface.transparent_pixel_count(), 0);
    assert_eq!(Color::from(surface.pixel(0, 0).unwrap()), start);
    assert_eq!(Color::from(surface.pixel(w - 1, h - 1).unwrap()), end);
}

#[tokio::test]
async fn test_render_previews_track_placement_changes() {
    let dir = TempDir::new().unwrap();
    let mut session = EditingSession::new(&offline_config(&dir)).unwrap();
    session.upload(&framed_subject_png()).unwrap();
    session.remove_background().await.unwrap();
    session.set_background(BackgroundSpec::Solid(Color::BLACK));

    let centered = session.render().await.unwrap();
    session.update_placement(PlacementState::default().with_offset(10.0, 0.0));
    let shifted = session.render().await.unwrap();

    assert_eq!(centered.dimensions(), shifted.dimensions());
    assert_ne!(centered.image().as_raw(), shifted.image().as_raw());
    // ten offset units move the rectangle 20px right
    assert_eq!(Color::from(shifted.pixel(27, 28).unwrap()), Color::BLACK);
    assert_ne!(Color::from(shifted.pixel(47, 28).unwrap()), Color::BLACK);
}

#[test]
fn test_foreground_layer_copies_rgb_and_mask_alpha() {
    let mut img = framed_subject(20, 20, (6, 6, 14, 14));
    img.put_pixel(9, 9, Rgba([90, 91, 92, 17]));
    let source = SourceImage::new(img.clone());
    let mask = segment(source.as_raw(), 20, 20, 28.0).unwrap();
    let expected_alpha = mask.data().to_vec();

    let layer = compositor::compose(&source, mask).unwrap();
    for (i, (got, original)) in layer.image().pixels().zip(img.pixels()).enumerate() {
        assert_eq!(got.0[..3], original.0[..3]);
        assert_eq!(got[3], expected_alpha[i]);
    }
}

#[test]
fn test_loader_bounds_longest_side() {
    let png = encode_png(&RgbaImage::from_pixel(2100, 700, Rgba(BACKGROUND)));
    let source = ImageLoader::default().load_from_bytes(&png).unwrap();
    assert_eq!(source.dimensions(), (2048, 683));
    assert_eq!(source.original_dimensions(), (2100, 700));
    assert_eq!(source.original_bytes(), Some(png.as_slice()));

    let small = encode_png(&RgbaImage::from_pixel(30, 20, Rgba(BACKGROUND)));
    let untouched = ImageLoader::default().load_from_bytes(&small).unwrap();
    assert!(!untouched.was_downscaled());
}

#[tokio::test]
async fn test_drag_updates_are_clamped_snapshots() {
    let dir = TempDir::new().unwrap();
    let mut session = EditingSession::new(&offline_config(&dir)).unwrap();
    let gesture = DragGesture::begin((50.0, 50.0), (200.0, 100.0), *session.placement());

    let state = *session.apply_drag(&gesture, (70.0, 60.0));
    assert_eq!(state.offset_x(), 10.0);
    assert_eq!(state.offset_y(), 10.0);

    let state = *session.apply_drag(&gesture, (-400.0, 400.0));
    assert_eq!(state.offset_x(), -30.0);
    assert_eq!(state.offset_y(), 20.0);
}
