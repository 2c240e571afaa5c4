use std::hint::black_box;
use std::time::Instant;

use sectorview_core::config::ViewerConfig;
use sectorview_core::types::SectorId;
use sectorview_render::coverage::{prioritize_sectors, unpack_sector_visibility};
use sectorview_render::readback::software::FenceBehavior;
use sectorview_render::readback::{
    read_pixels_async, ImmediateScheduler, PixelFormat, PixelRect, PixelType, ReadbackRequest,
    SoftwareReadbackContext,
};
use sectorview_render::BoundingBoxClipper;
use sectorview_sector::fixtures::FixtureDecoder;
use sectorview_sector::{
    merge_instance_meshes_by_file, merge_triangle_meshes_by_file, CachedRepository, SceneNode, SectorGeometry,
    SectorGeometryConsumer,
};

use crate::scenes::{self, SceneConfig, Workload};

/// Timing data for a single benchmark run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimingSeries {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Result of a single scene benchmark.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BenchmarkResult {
    pub scene_name: String,
    pub workload_size: u32,
    pub iterations: u32,
    /// Failed iterations (readback or load errors). Zero on a healthy run.
    pub failures: u32,
    pub timings: TimingSeries,
}

/// Runs CPU benchmarks over the software readback context and fixture
/// sector data.
pub struct BenchmarkRunner {
    iterations: u32,
    config: ViewerConfig,
}

impl BenchmarkRunner {
    pub fn new(iterations: u32, config: ViewerConfig) -> Self {
        Self { iterations, config }
    }

    /// Run a single benchmark scene and return timing results.
    pub fn run_scene(&self, scene: &SceneConfig) -> BenchmarkResult {
        log::info!("Running scene '{}' ({:?}, size {})...", scene.name, scene.workload, scene.size);

        let mut iteration = self.iteration_fn(scene);
        let mut times = Vec::with_capacity(self.iterations as usize);
        let mut failures = 0u32;
        for _ in 0..self.iterations {
            let start = Instant::now();
            let ok = iteration();
            times.push(start.elapsed().as_secs_f64() * 1000.0);
            if !ok {
                failures += 1;
            }
        }

        let timings = compute_timings(&times);
        log::info!(
            "  Done: mean={:.3}ms, p95={:.3}ms, p99={:.3}ms",
            timings.mean_ms,
            timings.p95_ms,
            timings.p99_ms
        );
        if failures > 0 {
            log::warn!("  {failures} of {} iterations failed", self.iterations);
        }

        BenchmarkResult {
            scene_name: scene.name.to_string(),
            workload_size: scene.size,
            iterations: self.iterations,
            failures,
            timings,
        }
    }

    /// Prepare inputs once and return the timed body. The body reports
    /// whether the iteration succeeded.
    fn iteration_fn(&self, scene: &SceneConfig) -> Box<dyn FnMut() -> bool> {
        let size = scene.size;
        match scene.workload {
            Workload::ClipperUpdates => {
                let mut clipper = BoundingBoxClipper::from(&self.config.clipping);
                Box::new(move || {
                    for i in 0..size {
                        let t = i as f32 * 1e-3;
                        clipper.set_min_x(-t);
                        clipper.set_max_y(1.0 + t);
                        clipper.set_intersection(i % 2 == 0);
                    }
                    black_box(clipper.clipping_planes());
                    true
                })
            }
            Workload::ConsumeSector => {
                let sector = SectorGeometry {
                    triangle_meshes: scenes::generate_triangle_meshes(size),
                    ..Default::default()
                };
                let bounds = scenes::sector_bounds(0);
                let consumer = SectorGeometryConsumer::new();
                Box::new(move || {
                    let mut root = SceneNode::group("bench-model");
                    let added = consumer.consume_detailed(SectorId(0), &bounds, &sector, &mut root);
                    black_box(&root);
                    added
                })
            }
            Workload::MergeMeshes => {
                let raw = scenes::generate_raw_meshes(size, (size / 8).max(1));
                let files = scenes::mesh_files_for(&raw);
                Box::new(move || black_box(merge_triangle_meshes_by_file(&raw, &files)).is_ok())
            }
            Workload::MergeInstances => {
                let file_count = (size / 16).max(1);
                let raw = scenes::generate_raw_instances(size, file_count);
                let files = scenes::instanced_files(file_count);
                Box::new(move || black_box(merge_instance_meshes_by_file(&raw, &files)).is_ok())
            }
            Workload::SoftwareReadback => {
                let mut ctx = SoftwareReadbackContext::new(size, size).with_fence_behavior(FenceBehavior::SignalAfter(2));
                for (i, byte) in ctx.pixels_mut().iter_mut().enumerate() {
                    *byte = (i % 251) as u8;
                }
                let readback = self.config.readback.clone();
                let mut destination = vec![0u8; (size * size * 4) as usize];
                Box::new(move || {
                    let request = ReadbackRequest::new(
                        PixelRect::new(0, 0, size, size),
                        PixelFormat::Rgba,
                        PixelType::UnsignedByte,
                        &mut destination,
                    );
                    let result = read_pixels_async(&ctx, request, ImmediateScheduler, &readback)
                        .and_then(pollster::block_on);
                    if let Err(e) = &result {
                        log::warn!("Readback failed: {e}");
                    }
                    result.is_ok()
                })
            }
            Workload::CoverageDecode => {
                let image = scenes::generate_coverage_image(size);
                Box::new(move || {
                    let visibility = unpack_sector_visibility(size, size, &image);
                    !black_box(prioritize_sectors(&visibility)).is_empty()
                })
            }
            Workload::RepositoryLoad => {
                let (provider, wanted) = scenes::generate_model("bench-model", size);
                let mut repository = CachedRepository::new(provider, FixtureDecoder, &self.config.repository);
                Box::new(move || {
                    repository.clear();
                    let results = repository.load_sectors(&wanted);
                    results.iter().all(|r| r.is_ok())
                })
            }
        }
    }
}

/// Compute timing statistics from a list of iteration times in milliseconds.
fn compute_timings(times: &[f64]) -> TimingSeries {
    if times.is_empty() {
        return TimingSeries {
            mean_ms: 0.0,
            median_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        };
    }

    let mut sorted = times.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };
    let p95_idx = ((n as f64) * 0.95).ceil() as usize;
    let p99_idx = ((n as f64) * 0.99).ceil() as usize;

    TimingSeries {
        mean_ms: mean,
        median_ms: median,
        p95_ms: sorted[p95_idx.min(n - 1)],
        p99_ms: sorted[p99_idx.min(n - 1)],
        min_ms: sorted[0],
        max_ms: sorted[n - 1],
    }
}
