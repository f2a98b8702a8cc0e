use bg_composer::{
    background::render_fill,
    compositor,
    config::{ColorMetric, SegmentationConfig, SegmentationStrategyKind},
    segmentation::segment_with,
    transform::draw_foreground,
    BackgroundSpec, Color, Effects, PlacementState, SourceImage,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgba, RgbaImage};

/// Studio-style backdrop with a soft vertical falloff and an elliptical subject
fn portrait_like(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let nx = (f64::from(x) / f64::from(width) - 0.5) / 0.22;
        let ny = (f64::from(y) / f64::from(height) - 0.6) / 0.35;
        if nx * nx + ny * ny <= 1.0 {
            Rgba([(120 + x % 40) as u8, (80 + y % 30) as u8, 60, 255])
        } else {
            let shade = 235 - (y * 12 / height.max(1)) as u8;
            Rgba([shade, shade, shade.saturating_add(4), 255])
        }
    })
}

fn bench_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");
    group.sample_size(20);

    for &(w, h) in &[(320, 240), (1024, 768)] {
        let image = portrait_like(w, h);
        for strategy in [SegmentationStrategyKind::BorderFlood, SegmentationStrategyKind::BorderSample] {
            for metric in [ColorMetric::Euclidean, ColorMetric::Weighted] {
                let config = SegmentationConfig {
                    strategy,
                    metric,
                    ..SegmentationConfig::default()
                };
                group.bench_with_input(
                    BenchmarkId::new(format!("{strategy}/{metric:?}"), format!("{w}x{h}")),
                    &config,
                    |b, config| {
                        b.iter(|| segment_with(black_box(image.as_raw()), w, h, config).unwrap());
                    },
                );
            }
        }
    }

    group.finish();
}

fn bench_placement(c: &mut Criterion) {
    let source = SourceImage::new(portrait_like(1024, 768));
    let mask = segment_with(source.as_raw(), 1024, 768, &SegmentationConfig::default()).unwrap();
    let foreground = compositor::compose(&source, mask).unwrap();
    let surface = render_fill(&BackgroundSpec::Solid(Color::WHITE), foreground.dimensions()).unwrap();

    let placements = [
        ("identity", PlacementState::default()),
        (
            "rotated_flipped",
            PlacementState::default().with_rotation(17.0).with_flip(true, false).with_scale(120.0),
        ),
        (
            "filtered_blurred",
            PlacementState::default().with_effects(Effects::new(130.0, 80.0, 40.0, 4.0)),
        ),
    ];

    let mut group = c.benchmark_group("placement");
    for (name, state) in placements {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut target = surface.clone();
                draw_foreground(&mut target, black_box(&foreground), &state).unwrap();
                target
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_segmentation, bench_placement);
criterion_main!(benches);
