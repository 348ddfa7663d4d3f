use criterion::{black_box, criterion_group, criterion_main, Criterion};
use espa_elevation::envi::{write_int16, ByteOrder, Int16Raster};
use espa_elevation::geo::{point_in_polygon, BoundingBox};
use espa_elevation::geoid::add_offsets;
use espa_elevation::tiles::{gls_tiles, gtopo30_tiles};
use espa_elevation::{GridOrigin, PixelSize, SceneExtent, WarpTarget};
use tempfile::TempDir;

/// Samples per side of a Landsat-sized scene at 30 m.
const SCENE_SAMPLES: usize = 7_800;

fn bench_warp_target(c: &mut Criterion) {
    let extent = SceneExtent::new(
        381_885.0,
        612_915.0,
        4_777_185.0,
        5_010_015.0,
        PixelSize::new(30.0, 30.0),
        GridOrigin::Corner,
    )
    .unwrap();

    c.bench_function("warp_target_corner", |b| {
        b.iter(|| black_box(WarpTarget::from_extent(black_box(&extent), "+proj=utm +zone=12")));
    });
}

fn bench_tile_selection(c: &mut Criterion) {
    let scene = BoundingBox::new(45.2, 43.1, -109.6, -112.5).padded(0.2);
    let crossing = BoundingBox::new(-16.0, -18.0, -179.2, 178.9).padded(0.2);

    c.bench_function("gls_tiles_scene", |b| {
        b.iter(|| black_box(gls_tiles(black_box(&scene))));
    });
    c.bench_function("gls_tiles_antimeridian", |b| {
        b.iter(|| black_box(gls_tiles(black_box(&crossing))));
    });
    c.bench_function("gtopo30_tiles_scene", |b| {
        b.iter(|| black_box(gtopo30_tiles(black_box(&scene), 1.0)));
    });
}

fn bench_ramp_overlap(c: &mut Criterion) {
    let footprint = vec![
        (-500_000.0, 500_000.0),
        (500_000.0, 500_000.0),
        (500_000.0, -500_000.0),
        (-500_000.0, -500_000.0),
        (-500_000.0, 500_000.0),
    ];

    c.bench_function("point_in_polygon", |b| {
        b.iter(|| {
            black_box(point_in_polygon(&footprint, black_box(1_000.0), black_box(-2_000.0)).unwrap())
        });
    });
}

fn bench_geoid_adjustment(c: &mut Criterion) {
    let elevation: Vec<i16> = (0..SCENE_SAMPLES * 100)
        .map(|i| (i % 4000) as i16)
        .collect();
    let geoid = vec![-17i16; elevation.len()];

    c.bench_function("add_offsets_100_lines", |b| {
        b.iter(|| {
            let mut values = elevation.clone();
            add_offsets(black_box(&mut values), black_box(&geoid));
            black_box(values);
        });
    });
}

fn bench_read_raster(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("elevation.img");
    let values: Vec<i16> = (0..SCENE_SAMPLES * 100).map(|i| (i % 3000) as i16).collect();
    write_int16(&image, &values, ByteOrder::Big).unwrap();
    std::fs::write(
        tmp.path().join("elevation.hdr"),
        format!(
            "ENVI\nsamples = {}\nlines = 100\nbands = 1\ndata type = 2\nbyte order = 1\n",
            SCENE_SAMPLES
        ),
    )
    .unwrap();

    c.bench_function("read_int16_big_endian", |b| {
        b.iter(|| {
            let raster = Int16Raster::open_with_header(black_box(&image)).unwrap();
            black_box(raster.values());
        });
    });
}

criterion_group!(
    benches,
    bench_warp_target,
    bench_tile_selection,
    bench_ramp_overlap,
    bench_geoid_adjustment,
    bench_read_raster,
);
criterion_main!(benches);
