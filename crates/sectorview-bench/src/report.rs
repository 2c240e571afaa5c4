use std::path::Path;

use crate::runner::BenchmarkResult;

/// A complete baseline containing results from all scenes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Baseline {
    pub timestamp: String,
    pub results: Vec<BenchmarkResult>,
}

/// Load a baseline from a JSON file. Returns None if the file is missing
/// or unreadable.
pub fn load_baseline(path: &Path) -> Option<Baseline> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(baseline) => Some(baseline),
        Err(e) => {
            log::warn!("Ignoring malformed baseline {}: {e}", path.display());
            None
        }
    }
}

pub fn save_baseline(path: &Path, baseline: &Baseline) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(baseline).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// Scenes whose mean time grew by more than `threshold_pct` percent, with
/// the change. Scenes missing from the baseline are skipped.
pub fn compare(
    current: &[BenchmarkResult],
    baseline: &Baseline,
    threshold_pct: f64,
) -> Vec<(String, f64)> {
    let mut regressions = Vec::new();

    for result in current {
        let Some(base) = baseline
            .results
            .iter()
            .find(|b| b.scene_name == result.scene_name)
        else {
            continue;
        };
        if base.timings.mean_ms <= 0.0 {
            continue;
        }
        let pct_change = (result.timings.mean_ms - base.timings.mean_ms) / base.timings.mean_ms * 100.0;
        if pct_change > threshold_pct {
            regressions.push((result.scene_name.clone(), pct_change));
        }
    }

    regressions
}

/// Format results as a markdown summary table.
pub fn format_markdown(results: &[BenchmarkResult]) -> String {
    let mut out = String::new();
    out.push_str("| Scene | Size | Iterations | Failures | Mean (ms) | Median (ms) | P95 (ms) | P99 (ms) | Min (ms) | Max (ms) |\n");
    out.push_str("|-------|------|------------|----------|-----------|-------------|----------|----------|----------|----------|\n");

    for r in results {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} |\n",
            r.scene_name,
            r.workload_size,
            r.iterations,
            r.failures,
            r.timings.mean_ms,
            r.timings.median_ms,
            r.timings.p95_ms,
            r.timings.p99_ms,
            r.timings.min_ms,
            r.timings.max_ms,
        ));
    }

    out
}

/// Format a comparison report showing regressions.
pub fn format_comparison(regressions: &[(String, f64)], threshold_pct: f64) -> String {
    if regressions.is_empty() {
        return format!("All scenes within {threshold_pct:.0}% threshold. No regressions detected.\n");
    }

    let mut out = format!("REGRESSIONS DETECTED (>{threshold_pct:.0}% threshold):\n");
    for (scene, pct) in regressions {
        out.push_str(&format!("  - {scene}: +{pct:.1}%\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TimingSeries;

    fn result(name: &str, mean_ms: f64) -> BenchmarkResult {
        BenchmarkResult {
            scene_name: name.to_string(),
            workload_size: 1,
            iterations: 1,
            failures: 0,
            timings: TimingSeries {
                mean_ms,
                median_ms: mean_ms,
                p95_ms: mean_ms,
                p99_ms: mean_ms,
                min_ms: mean_ms,
                max_ms: mean_ms,
            },
        }
    }

    #[test]
    fn test_compare_flags_only_regressions_over_threshold() {
        let baseline = Baseline {
            timestamp: "t".into(),
            results: vec![result("a", 10.0), result("b", 10.0), result("zero", 0.0)],
        };
        let current = [result("a", 12.0), result("b", 10.5), result("new", 99.0), result("zero", 1.0)];
        let regressions = compare(&current, &baseline, 10.0);
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].0, "a");
        assert!((regressions[0].1 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_json_survives_save_and_load() {
        let path = std::env::temp_dir().join(format!("sectorview-bench-{}.json", std::process::id()));
        let baseline = Baseline {
            timestamp: "bench-1".into(),
            results: vec![result("a", 1.5)],
        };
        save_baseline(&path, &baseline).expect("save");
        let loaded = load_baseline(&path).expect("load");
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.results[0].scene_name, "a");
        assert_eq!(loaded.results[0].timings.mean_ms, 1.5);
    }

    #[test]
    fn test_markdown_has_row_per_result() {
        let table = format_markdown(&[result("a", 1.0), result("b", 2.0)]);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("| a | 1 | 1 | 0 |"));
    }
}
