// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Lists the built-in trainers and record schemas

use anyhow::Result;
use clap::Parser;
use tabular_bench::schema::{FieldKind, RecordSchema};
use tabular_bench::trainers::TrainerKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "list-trainers")]
#[command(about = "List available trainers and built-in schemas")]
#[command(version)]
struct Args {
    /// Also print every field of each built-in schema
    #[arg(short, long)]
    fields: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!("Available trainers:");
    println!("-------------------");
    for kind in TrainerKind::ALL {
        let trainer = kind.build(42);
        let auc = if kind.calibrated() { "AUC" } else { "no AUC" };
        println!("  {:<22} [{:>6}] {}", kind.name(), auc, trainer.description());
    }

    println!("\nBuilt-in schemas:");
    println!("-----------------");
    for id in RecordSchema::BUILTIN {
        let schema = RecordSchema::builtin(id)?;
        println!(
            "  {:<15} {} ({} fields, label '{}')",
            schema.id,
            schema.name,
            schema.fields.len(),
            schema.label_field
        );
        if args.fields {
            for field in &schema.fields {
                let kind = match field.kind {
                    FieldKind::Numeric => "numeric",
                    FieldKind::Categorical => "categorical",
                };
                println!("      {:<14} {}", field.name, kind);
            }
        }
    }

    Ok(())
}
