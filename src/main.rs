use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use legacy_audit::{
    external_check, load_legacy_csv, logging, parse_fixed_text, reformat_identifier, AuditEngine,
    LegacyEntry, ModernEntry, Settings, SimulatedRegistry, Transformer,
};

/// Command-line arguments for legacy-audit
#[derive(Parser, Debug)]
#[command(name = "legacy-audit")]
#[command(about = "Transform and audit legacy tax records")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse one fixed-format line, e.g. "NOME: JOHN DOE NASC: 1960-05-15 REND: $45000.00"
    Transform { line: String },

    /// Convert a CSV batch of legacy records into modern records
    Modernize { csv: PathBuf },

    /// Run the audit rules over a CSV batch of legacy records
    Audit { csv: PathBuf },

    /// Re-punctuate a raw identifier as NNN-NN-NNNN
    Reformat { tax_id: String },

    /// Query the simulated federal registry for one identifier
    Check {
        tax_id: String,

        /// Seed for reproducible answers
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Batch conversion output: converted records plus per-row failures
#[derive(Serialize)]
struct ModernBatch {
    id: uuid::Uuid,
    timestamp: DateTime<Utc>,
    total: usize,
    records: Vec<ModernEntry>,
    errors: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&settings.logging.level);

    match args.command {
        Command::Transform { line } => {
            let parsed = parse_fixed_text(&line).context("Failed to parse legacy line")?;
            print_json(&parsed)
        }
        Command::Modernize { csv } => {
            let batch = run_modernize(&settings, &csv)?;
            print_json(&batch)
        }
        Command::Audit { csv } => {
            let records = load_legacy_csv(&csv)?;
            info!("Auditing {} records from {}", records.len(), csv.display());

            let report = AuditEngine::with_settings(&settings.audit).run(&records);
            info!("{}", report.summary());
            print_json(&report)
        }
        Command::Reformat { tax_id } => {
            let identifier = reformat_identifier(&tax_id);
            print_json(&serde_json::json!({
                "identifier": identifier.as_str(),
                "formatted": identifier.is_formatted(),
            }))
        }
        Command::Check { tax_id, seed } => {
            let registry = match seed {
                Some(seed) => SimulatedRegistry::seeded(seed),
                None => SimulatedRegistry::new(),
            };
            let result = external_check(&registry, &tax_id).context("External check failed")?;
            print_json(&result)
        }
    }
}

fn run_modernize(settings: &Settings, csv: &std::path::Path) -> Result<ModernBatch> {
    let records = load_legacy_csv(csv)?;
    let transformer = Transformer::new(&settings.transform);
    let now = Utc::now();

    let mut converted = Vec::new();
    let mut errors = Vec::new();

    for record in records {
        let id = record.id;
        match LegacyEntry::try_from(record) {
            Ok(entry) => converted.push(transformer.to_modern_at(&entry, now)),
            Err(e) => {
                warn!("Skipping record {}: {}", id, e);
                errors.push(format!("record {}: {}", id, e));
            }
        }
    }

    info!(
        "Converted {} records ({} rejected) from {}",
        converted.len(),
        errors.len(),
        csv.display()
    );

    Ok(ModernBatch {
        id: uuid::Uuid::new_v4(),
        timestamp: now,
        total: converted.len(),
        records: converted,
        errors,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
