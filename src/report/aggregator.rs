//! Merging job reports into per-label score series.

use crate::models::{parse_commit_timestamp, JobReport, LabelSeries, ScoreEntry};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Keep only labels containing one of `filters`. An empty filter keeps all.
pub fn label_matches(label: &str, filters: &[String]) -> bool {
    filters.is_empty() || filters.iter().any(|f| label.contains(f.as_str()))
}

/// Drop duplicate runs, keeping the latest attempt of each.
pub fn dedup_runs(reports: &[JobReport]) -> Vec<&JobReport> {
    let mut by_id: HashMap<&str, &JobReport> = HashMap::new();

    for report in reports {
        by_id
            .entry(report.bench_run.id.as_str())
            .and_modify(|existing| {
                if report.bench_run.run_attempt > existing.bench_run.run_attempt {
                    *existing = report;
                }
            })
            .or_insert(report);
    }

    by_id.into_values().collect()
}

/// Merge job reports into one series per label, ordered by commit timestamp.
///
/// Reports whose commit timestamp cannot be parsed are skipped.
pub fn merge_reports(reports: &[JobReport], label_filter: &[String]) -> Vec<LabelSeries> {
    let mut timed: Vec<(DateTime<Utc>, &JobReport)> = dedup_runs(reports)
        .into_iter()
        .filter_map(|report| match parse_commit_timestamp(&report.bench_run.head_commit) {
            Ok(ts) => Some((ts, report)),
            Err(e) => {
                warn!(run_id = %report.bench_run.id, error = %e, "skipping report");
                None
            }
        })
        .collect();
    timed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.bench_run.id.cmp(&b.1.bench_run.id))
    });

    let mut grouped: BTreeMap<&str, Vec<ScoreEntry>> = BTreeMap::new();

    for (timestamp, report) in &timed {
        for (label, &score) in &report.label_score_dict {
            if !label_matches(label, label_filter) {
                continue;
            }

            let entries = grouped.entry(label.as_str()).or_default();
            let previous = entries.last().map(|e| e.score);
            let score_diff = previous.map(|p| score - p);
            let score_diff_perc = previous
                .filter(|p| *p != 0.0)
                .map(|p| (score - p) / p * 100.0);

            entries.push(ScoreEntry {
                score,
                score_diff,
                score_diff_perc,
                commit_timestamp: *timestamp,
                bench_run: report.bench_run.clone(),
            });
        }
    }

    debug!(
        "Merged {} reports into {} label series",
        timed.len(),
        grouped.len()
    );

    grouped
        .into_iter()
        .map(|(label, entries)| LabelSeries {
            label: label.to_string(),
            entries,
        })
        .collect()
}

/// Labels whose latest change exceeds `threshold_perc` in either direction.
pub fn significant_changes(series: &[LabelSeries], threshold_perc: f64) -> Vec<(&str, f64)> {
    let mut changes: Vec<(&str, f64)> = series
        .iter()
        .filter_map(|s| {
            let perc = s.latest()?.score_diff_perc?;
            (perc.abs() >= threshold_perc).then_some((s.label.as_str(), perc))
        })
        .collect();

    changes.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    changes
}
