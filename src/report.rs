// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Report rendering: console table, markdown and JSON

use crate::error::{BenchError, Result};
use crate::metrics::{format_auc, format_metric};
use crate::pipeline::{BenchmarkReport, ModelOutcome};
use std::path::Path;

/// Save the full report as pretty JSON
pub fn save_json(report: &BenchmarkReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(output_path, json).map_err(|source| BenchError::Io {
        path: output_path.to_path_buf(),
        source,
    })?;
    tracing::info!("Results saved to {}", output_path.display());
    Ok(())
}

/// Fixed-width comparison table, one row per registry entry
pub fn console_table(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let rule = "-".repeat(78);

    out.push_str(&format!(
        "{:<22} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
        "Model", "Accuracy", "Precision", "Recall", "F1", "AUC"
    ));
    out.push_str(&rule);
    out.push('\n');

    for outcome in &report.outcomes {
        match outcome {
            ModelOutcome::Evaluated(r) => out.push_str(&format!(
                "{:<22} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
                r.model_name,
                format_metric(r.accuracy),
                format_metric(r.precision),
                format_metric(r.recall),
                format_metric(r.f1),
                format_auc(r.auc),
            )),
            ModelOutcome::Failed(f) => out.push_str(&format!(
                "{:<22} FAILED ({:?}): {}\n",
                f.model_name, f.step, f.error
            )),
        }
    }
    out.push_str(&rule);
    out.push('\n');

    match (&report.summary.best_model, report.summary.best_f1) {
        (Some(name), Some(f1)) => {
            out.push_str(&format!("Best model: {} (F1={})\n", name, format_metric(f1)))
        }
        _ => out.push_str("Best model: none (no trainer was evaluated)\n"),
    }
    if report.summary.failed > 0 {
        out.push_str(&format!("Failed trainers: {}\n", report.summary.failed));
    }

    out
}

/// Markdown report
pub fn generate_markdown(report: &BenchmarkReport) -> String {
    let info = &report.dataset_info;
    let mut md = String::new();

    md.push_str("# Tabular Classification Benchmark Report\n\n");
    md.push_str(&format!(
        "**Generated:** {}\n\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("**Version:** {}\n\n", report.version));

    md.push_str("## Dataset\n\n");
    md.push_str(&format!("- **Schema:** {} ({})\n", info.schema_name, info.schema_id));
    md.push_str(&format!("- **Split:** {}\n", info.split_mode));
    md.push_str(&format!(
        "- **Train records:** {} ({} positive / {} negative)\n",
        info.train_records, info.train_distribution.positive, info.train_distribution.negative
    ));
    md.push_str(&format!(
        "- **Test records:** {} ({} positive / {} negative)\n",
        info.test_records, info.test_distribution.positive, info.test_distribution.negative
    ));
    md.push_str(&format!("- **Encoded dimension:** {}\n", info.encoded_dimension));
    md.push_str(&format!("- **Seed:** {}\n", report.config.random_seed));
    for source in &info.sources {
        match &source.fingerprint {
            Some(sha) => md.push_str(&format!(
                "- **Source:** {} ({} records, sha256 `{}`)\n",
                source.name, source.records, sha
            )),
            None => md.push_str(&format!(
                "- **Source:** {} ({} records)\n",
                source.name, source.records
            )),
        }
    }
    md.push('\n');

    md.push_str("## Summary\n\n");
    match (&report.summary.best_model, report.summary.best_f1) {
        (Some(name), Some(f1)) => md.push_str(&format!(
            "**Best Model:** {} (F1={})\n\n",
            name,
            format_metric(f1)
        )),
        _ => md.push_str("**Best Model:** none\n\n"),
    }
    md.push_str(&format!(
        "{} evaluated, {} failed\n\n",
        report.summary.evaluated, report.summary.failed
    ));

    md.push_str("| Model | Accuracy | Precision | Recall | F1 | AUC |\n");
    md.push_str("|-------|----------|-----------|--------|----|-----|\n");
    for outcome in &report.outcomes {
        match outcome {
            ModelOutcome::Evaluated(r) => md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                r.model_name,
                format_metric(r.accuracy),
                format_metric(r.precision),
                format_metric(r.recall),
                format_metric(r.f1),
                format_auc(r.auc),
            )),
            ModelOutcome::Failed(f) => {
                md.push_str(&format!("| {} | failed | - | - | - | - |\n", f.model_name))
            }
        }
    }

    md.push_str("\n## Detailed Results\n\n");
    for outcome in &report.outcomes {
        match outcome {
            ModelOutcome::Evaluated(r) => {
                md.push_str(&format!("### {}\n\n", r.model_name));
                md.push_str(&format!("```\n{}```\n\n", r.format()));
            }
            ModelOutcome::Failed(f) => {
                md.push_str(&format!("### {}\n\n", f.model_name));
                md.push_str(&format!("Failed during {:?}: {}\n\n", f.step, f.error));
            }
        }
    }

    md.push_str("## Configuration\n\n");
    md.push_str(&format!(
        "```json\n{}\n```\n",
        serde_json::to_string_pretty(&report.config).unwrap_or_default()
    ));

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchmarkConfig;
    use crate::pipeline::BenchmarkPipeline;

    fn small_report() -> BenchmarkReport {
        let config = BenchmarkConfig {
            trainer_registry: vec!["majority".to_string(), "linear-svm".to_string()],
            ..BenchmarkConfig::default()
        };
        BenchmarkPipeline::new(config).run().unwrap()
    }

    #[test]
    fn test_console_table_rows_in_order() {
        let table = console_table(&small_report());
        let majority = table.find("majority").unwrap();
        let svm = table.find("linear-svm").unwrap();
        assert!(majority < svm);
        // Uncalibrated model has no AUC
        let svm_line = table.lines().find(|l| l.starts_with("linear-svm")).unwrap();
        assert!(svm_line.trim_end().ends_with("N/A"));
    }

    #[test]
    fn test_generate_markdown() {
        let md = generate_markdown(&small_report());
        assert!(md.contains("# Tabular Classification Benchmark Report"));
        assert!(md.contains("| majority |"));
        assert!(md.contains("Heart Disease") || md.contains("heart-disease"));
        assert!(md.contains("## Configuration"));
    }

    #[test]
    fn test_save_json_roundtrips_outcomes() {
        let report = small_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        save_json(&report, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let outcomes = value["outcomes"].as_array().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["status"], "evaluated");
        assert_eq!(outcomes[0]["model_name"], "majority");
        assert!(outcomes[1]["auc"].is_null());
    }

    #[test]
    fn test_saved_report_with_undefined_ratios_loads_back() {
        let mut report = small_report();
        let auc = match &mut report.outcomes[0] {
            ModelOutcome::Evaluated(r) => {
                r.precision = f64::NAN;
                r.auc
            }
            other => panic!("expected evaluation, got {:?}", other),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        save_json(&report, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["outcomes"][0]["precision"], "NaN");

        let loaded: BenchmarkReport = serde_json::from_str(&text).unwrap();
        let result = loaded.outcomes[0].evaluation().unwrap();
        assert!(result.precision.is_nan());
        assert_eq!(result.auc, auc);
        assert_eq!(loaded.outcomes, report.outcomes);
    }
}
