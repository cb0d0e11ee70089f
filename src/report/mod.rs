//! Report assembly and output.

pub mod aggregator;
pub mod generator;

pub use aggregator::merge_reports;
pub use generator::{generate_csv_report, generate_json_report, generate_markdown_report};
