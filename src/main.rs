// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Benchmark CLI for tabular binary classifiers
//!
//! Usage:
//!   tabular-bench --schema heart-disease --synthetic-rows 500 --seed 42
//!   tabular-bench --schema thyroid-recurrence --data ./data/thyroid.csv --test-fraction 0.3
//!   tabular-bench --schema thyroid-recurrence --train train.csv --test test.csv
//!   tabular-bench --config bench.json

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tabular_bench::config::{BenchmarkConfig, SchemaRef};
use tabular_bench::datasets::{RecordSource, SplitMode};
use tabular_bench::pipeline::BenchmarkPipeline;
use tabular_bench::report;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
    Both,
    None,
}

#[derive(Parser, Debug)]
#[command(name = "tabular-bench")]
#[command(about = "Benchmark binary classifiers on a tabular dataset")]
#[command(version)]
struct Args {
    /// JSON configuration file (overrides the dataset flags)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in schema (thyroid-recurrence, heart-disease)
    #[arg(long, default_value = "heart-disease")]
    schema: String,

    /// Single CSV file to split at random
    #[arg(short, long, conflicts_with_all = ["train", "test"])]
    data: Option<PathBuf>,

    /// Training CSV file (pre-split mode)
    #[arg(long, requires = "test")]
    train: Option<PathBuf>,

    /// Test CSV file (pre-split mode)
    #[arg(long, requires = "train")]
    test: Option<PathBuf>,

    /// Fraction of records held out for testing in random mode
    #[arg(long, default_value_t = 0.3)]
    test_fraction: f64,

    /// Random seed for reproducibility
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Trainers to run, in order (comma-separated, empty = all)
    #[arg(short, long)]
    trainers: Option<String>,

    /// CSV files have no header row (fields in schema order, label last)
    #[arg(long)]
    no_headers: bool,

    /// Rows generated when no CSV file is given
    #[arg(long, default_value_t = 500)]
    synthetic_rows: usize,

    /// Output directory for reports
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Report files to write
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,
}

fn csv_source(path: PathBuf, no_headers: bool) -> RecordSource {
    RecordSource::Csv {
        path,
        has_headers: !no_headers,
    }
}

fn build_config(args: &Args) -> Result<BenchmarkConfig> {
    if let Some(path) = &args.config {
        return BenchmarkConfig::from_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()));
    }

    let split_mode = match (&args.data, &args.train, &args.test) {
        (Some(data), _, _) => SplitMode::Random {
            source: csv_source(data.clone(), args.no_headers),
            test_fraction: args.test_fraction,
        },
        (None, Some(train), Some(test)) => SplitMode::PreSplit {
            train: csv_source(train.clone(), args.no_headers),
            test: csv_source(test.clone(), args.no_headers),
        },
        (None, None, None) => SplitMode::Random {
            source: RecordSource::Synthetic {
                rows: args.synthetic_rows,
            },
            test_fraction: args.test_fraction,
        },
        _ => bail!("--train and --test must be given together"),
    };

    let trainer_registry = match &args.trainers {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => BenchmarkConfig::default().trainer_registry,
    };

    Ok(BenchmarkConfig {
        dataset_schema: SchemaRef::Builtin(args.schema.clone()),
        split_mode,
        random_seed: args.seed,
        trainer_registry,
    })
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    config.validate().context("invalid benchmark configuration")?;

    tracing::info!("Tabular Classification Benchmark");
    tracing::info!("================================");
    tracing::info!("Schema: {}", config.dataset_schema.id());
    tracing::info!("Split: {}", config.split_mode.name());
    tracing::info!("Seed: {}", config.random_seed);

    let schema_id = config.dataset_schema.id().to_string();
    let pipeline = BenchmarkPipeline::new(config);
    let results = pipeline.run().context("benchmark aborted")?;

    println!("\n{}", "=".repeat(78));
    println!(
        "BENCHMARK SUMMARY ({} train / {} test records)",
        results.dataset_info.train_records, results.dataset_info.test_records
    );
    println!("{}", "=".repeat(78));
    print!("{}", report::console_table(&results));

    if args.format == OutputFormat::None {
        return Ok(());
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    if matches!(args.format, OutputFormat::Json | OutputFormat::Both) {
        let json_path = args.output.join(format!("bench_{}_{}.json", schema_id, timestamp));
        report::save_json(&results, &json_path)?;
        println!("\nJSON results saved to: {}", json_path.display());
    }

    if matches!(args.format, OutputFormat::Markdown | OutputFormat::Both) {
        let md_path = args.output.join(format!("bench_{}_{}.md", schema_id, timestamp));
        std::fs::write(&md_path, report::generate_markdown(&results))
            .with_context(|| format!("failed to write {}", md_path.display()))?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    println!("\nBenchmark complete!");

    Ok(())
}
