//! Benchmark artifact extraction and parsing.
//!
//! An artifact is a zip archive holding `bench-report.xml`:
//!
//! ```text
//! <ReportOutput>
//!   <cases>
//!     <case>
//!       <label>org.enso.benchmarks.Foo.bar</label>
//!       <scores><score>12.5</score></scores>
//!     </case>
//!   </cases>
//! </ReportOutput>
//! ```

use crate::error::{BenchError, BenchResult};
use crate::models::BENCH_REPORT_FILE_NAME;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Read the report file out of a downloaded artifact archive.
pub fn extract_report_xml(zip_path: &Path) -> BenchResult<String> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let is_report = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n == BENCH_REPORT_FILE_NAME))
            .unwrap_or(false);
        if !is_report {
            continue;
        }

        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        return Ok(content);
    }

    Err(BenchError::Artifact {
        message: format!(
            "{} not found in {}",
            BENCH_REPORT_FILE_NAME,
            zip_path.display()
        ),
    })
}

/// Parse a bench report into a label -> score mapping.
///
/// When a case carries several scores the last one wins. Cases without a
/// label or without scores are skipped.
pub fn parse_bench_report_xml(xml: &str) -> BenchResult<BTreeMap<String, f64>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| BenchError::Parse {
        message: format!("invalid bench report XML: {}", e),
    })?;

    let mut label_score = BTreeMap::new();
    let cases = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("cases"))
        .flat_map(|n| n.children().filter(|c| c.has_tag_name("case")));

    for case in cases {
        let label = case
            .children()
            .find(|n| n.has_tag_name("label"))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let Some(label) = label else {
            warn!("skipping benchmark case without label");
            continue;
        };

        let mut scores = Vec::new();
        for score in case
            .children()
            .filter(|n| n.has_tag_name("scores"))
            .flat_map(|n| n.children().filter(|s| s.has_tag_name("score")))
        {
            let text = score.text().unwrap_or("").trim();
            let value: f64 = text.parse().map_err(|_| BenchError::Parse {
                message: format!("invalid score '{}' for label {}", text, label),
            })?;
            scores.push(value);
        }

        match scores.last() {
            Some(&last) => {
                if scores.len() > 1 {
                    warn!(
                        label,
                        count = scores.len(),
                        "multiple scores for a label, using the last one"
                    );
                }
                label_score.insert(label.to_string(), last);
            }
            None => warn!(label, "skipping benchmark case without scores"),
        }
    }

    Ok(label_score)
}
