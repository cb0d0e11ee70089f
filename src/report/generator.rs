//! Report output in JSON, CSV and Markdown.

use crate::error::{BenchError, BenchResult};
use crate::models::{BenchmarksReport, LabelSeries, ReportMetadata};
use crate::report::aggregator::significant_changes;

/// Threshold for the "Significant Changes" Markdown section.
const SIGNIFICANT_CHANGE_PERC: f64 = 5.0;

const CSV_HEADER: [&str; 8] = [
    "label",
    "score",
    "commit_id",
    "commit_msg",
    "commit_author",
    "commit_timestamp",
    "bench_run_url",
    "bench_run_event",
];

/// Generate a JSON report.
pub fn generate_json_report(report: &BenchmarksReport) -> BenchResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Generate a CSV report with one row per label and bench run.
pub fn generate_csv_report(report: &BenchmarksReport) -> BenchResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for series in &report.labels {
        for entry in &series.entries {
            let commit = &entry.bench_run.head_commit;
            let score = entry.score.to_string();
            writer.write_record([
                series.label.as_str(),
                score.as_str(),
                commit.id.as_str(),
                commit.title(),
                commit.author.name.as_str(),
                commit.timestamp.as_str(),
                entry.bench_run.html_url.as_str(),
                entry.bench_run.event.as_str(),
            ])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BenchError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| BenchError::Parse {
        message: e.to_string(),
    })
}

/// Generate a Markdown summary.
pub fn generate_markdown_report(report: &BenchmarksReport) -> String {
    let mut output = String::new();

    output.push_str("# Benchmark Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_changes_section(&report.labels));
    output.push_str(&generate_labels_section(&report.labels));

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Repository:** {}\n", metadata.repository));
    section.push_str(&format!(
        "- **Source:** {} (workflow {})\n",
        metadata.source, metadata.workflow_id
    ));
    section.push_str(&format!(
        "- **Branches:** {}\n",
        metadata.branches.join(", ")
    ));
    section.push_str(&format!(
        "- **Period:** {} to {}\n",
        metadata.since.format("%Y-%m-%d"),
        metadata.until.format("%Y-%m-%d")
    ));
    section.push_str(&format!("- **Bench Runs:** {}\n", metadata.runs));
    section.push_str(&format!(
        "- **Generated:** {}\n\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    section
}

fn generate_changes_section(labels: &[LabelSeries]) -> String {
    let changes = significant_changes(labels, SIGNIFICANT_CHANGE_PERC);
    if changes.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Significant Changes\n\n");
    section.push_str(&format!(
        "Labels whose latest score moved by at least {}%:\n\n",
        SIGNIFICANT_CHANGE_PERC
    ));
    section.push_str("| Label | Change |\n");
    section.push_str("|:---|---:|\n");
    for (label, perc) in changes {
        section.push_str(&format!("| `{}` | {:+.2}% |\n", label, perc));
    }
    section.push('\n');

    section
}

fn generate_labels_section(labels: &[LabelSeries]) -> String {
    let mut section = String::new();

    section.push_str("## Scores\n\n");

    if labels.is_empty() {
        section.push_str("No benchmark scores were found for the selected runs.\n");
        return section;
    }

    section.push_str("| Label | Runs | Latest | Min | Max | Last Change |\n");
    section.push_str("|:---|:---:|---:|---:|---:|---:|\n");

    for series in labels {
        let latest = series.latest();
        let fmt_score = |v: Option<f64>| v.map(|s| format!("{:.3}", s)).unwrap_or_default();
        let change = latest
            .and_then(|e| e.score_diff_perc)
            .map(|p| format!("{:+.2}%", p))
            .unwrap_or_else(|| "-".to_string());

        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} |\n",
            series.label,
            series.entries.len(),
            fmt_score(latest.map(|e| e.score)),
            fmt_score(series.min_score()),
            fmt_score(series.max_score()),
            change
        ));
    }
    section.push('\n');

    section
}
