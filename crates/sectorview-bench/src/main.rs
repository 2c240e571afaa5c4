use std::path::PathBuf;
use std::process;

use sectorview_bench::report;
use sectorview_bench::runner::BenchmarkRunner;
use sectorview_bench::scenes;
use sectorview_core::config::ViewerConfig;

fn usage() {
    eprintln!("Usage: bench-runner [OPTIONS]");
    eprintln!("  --iterations <n>               Iterations per scene (default: 50)");
    eprintln!("  --config <path>                Load viewer settings from a RON file");
    eprintln!("  --baseline <path>              Load baseline JSON for comparison");
    eprintln!("  --output <path>                Save current results as JSON baseline");
    eprintln!("  --regression-threshold <pct>   Regression threshold percentage (default: 10)");
}

/// Value following a flag, exiting with usage on a missing or bad value.
fn flag_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i).map(|v| v.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("invalid or missing value for {flag}");
            usage();
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut baseline_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut regression_threshold = 10.0f64;
    let mut iterations = 50u32;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--baseline" => {
                i += 1;
                baseline_path = Some(flag_value(&args, i, "--baseline"));
            }
            "--output" => {
                i += 1;
                output_path = Some(flag_value(&args, i, "--output"));
            }
            "--config" => {
                i += 1;
                config_path = Some(flag_value(&args, i, "--config"));
            }
            "--regression-threshold" => {
                i += 1;
                regression_threshold = flag_value(&args, i, "--regression-threshold");
            }
            "--iterations" => {
                i += 1;
                iterations = flag_value(&args, i, "--iterations");
            }
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|s| ViewerConfig::from_ron_str(&s).map_err(|e| e.to_string()));
            match loaded {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Failed to load config {}: {e}", path.display());
                    process::exit(1);
                }
            }
        }
        None => ViewerConfig::default(),
    };

    let runner = BenchmarkRunner::new(iterations, config);
    let results: Vec<_> = scenes::standard_scenes()
        .iter()
        .map(|scene| runner.run_scene(scene))
        .collect();

    println!("\n## Benchmark Results\n");
    println!("{}", report::format_markdown(&results));

    if let Some(ref path) = output_path {
        let baseline = report::Baseline {
            timestamp: format!("bench-{}", process::id()),
            results: results.clone(),
        };
        match report::save_baseline(path, &baseline) {
            Ok(()) => log::info!("Saved baseline to {}", path.display()),
            Err(e) => {
                eprintln!("Failed to save baseline {}: {e}", path.display());
                process::exit(1);
            }
        }
    }

    if let Some(ref path) = baseline_path {
        if let Some(baseline) = report::load_baseline(path) {
            let regressions = report::compare(&results, &baseline, regression_threshold);
            println!("{}", report::format_comparison(&regressions, regression_threshold));
            if !regressions.is_empty() {
                eprintln!("ERROR: {} regressions detected, exiting with code 1", regressions.len());
                process::exit(1);
            }
        } else {
            log::warn!("Baseline file not found: {}", path.display());
        }
    }

    if results.iter().any(|r| r.failures > 0) {
        eprintln!("ERROR: some scenes had failing iterations");
        process::exit(1);
    }

    log::info!("Benchmark complete.");
}
