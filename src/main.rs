//! `allele-nomenclature`: CLI entry point. Parses arguments into a
//! [`RunConfig`], drives one [`controller::run`], and reports the result.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use allele_nomenclature::config::{Organism, RunConfig};
use allele_nomenclature::controller::{self, RunSummary};
use allele_nomenclature::error::NomenclatureError;
use allele_nomenclature::input::load_core_loci;
use allele_nomenclature::logging;
use allele_nomenclature::progress::DotBarProgress;

/// Assigns cgMLST allele codes to a batch of isolate profiles.
#[derive(Parser, Debug)]
#[command(name = "allele-nomenclature", version = allele_nomenclature::VERSION)]
struct Cli {
    /// Batch allele-call matrix (csv or tsv, by extension).
    #[arg(short = 'a', long = "alleles")]
    alleles: PathBuf,

    /// Core-loci config file (one locus name per line).
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Root of the persistent data/log directory tree.
    #[arg(short = 'd', long = "data-dir")]
    data_dir: PathBuf,

    /// Organism prefix, selecting the threshold table.
    #[arg(short = 'p', long = "prefix", value_enum)]
    prefix: Organism,

    /// Compute and report without persisting tree/profile-store changes.
    #[arg(long)]
    nosave: bool,

    /// Mirror log output to stdout.
    #[arg(long)]
    verbose: bool,

    /// Result table path; delimiter inferred from extension (`.csv` -> `,`,
    /// otherwise tab). Printed to stdout when omitted.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("allele-nomenclature: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), NomenclatureError> {
    let core_loci = load_core_loci(&cli.config, cli.prefix.abbreviation())?;
    let config = RunConfig {
        thresholds: cli.prefix.thresholds(),
        organism: cli.prefix,
        core_loci,
        min_present: allele_nomenclature::config::DEFAULT_MIN_PRESENT,
        data_dir: cli.data_dir.clone(),
        log_dir: cli.data_dir,
        nosave: cli.nosave,
        verbose: cli.verbose,
    };

    let _ = logging::install(&config.logs_dir(), config.verbose);

    let mut progress = DotBarProgress::default();
    let summary = controller::run(&config, &cli.alleles, &mut progress)?;

    report(&summary, cli.output.as_deref())?;
    Ok(())
}

fn report(summary: &RunSummary, output: Option<&std::path::Path>) -> Result<(), NomenclatureError> {
    println!("{} new code(s), {} change(s), {} QC failure(s)", summary.new_codes.len(), summary.changes.len(), summary.below_qc.len());
    for record in &summary.changes {
        println!(
            "  {} : {} -> {} ({:?})",
            record.key,
            record.old_value.as_deref().unwrap_or("(none)"),
            record.new_value,
            record.change
        );
    }
    for (key, reasons) in &summary.below_qc {
        println!("  QC fail: {key} ({})", reasons.join(", "));
    }

    let delimiter = match output {
        Some(path) if path.extension().and_then(|e| e.to_str()) == Some("csv") => ',',
        _ => '\t',
    };
    let header = format!("Key{delimiter}Allele_code");
    let mut lines = vec![header];
    for (key, code) in &summary.new_codes {
        lines.push(format!("{key}{delimiter}{code}"));
    }
    let body = lines.join("\n");

    match output {
        Some(path) => std::fs::write(path, body + "\n")?,
        None => println!("{body}"),
    }
    Ok(())
}
