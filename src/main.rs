use std::path::PathBuf;
use std::process;

use clap::Parser;

use peplist2pepxml::converter::{convert, ConversionSettings};
use peplist2pepxml::events::EventSeverity;
use peplist2pepxml::io::phrp::PhrpOptions;

/// Convert a PHRP tab-delimited result file to pepXML
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// PHRP synopsis file, e.g. Dataset_msgfplus_syn.txt
    input: PathBuf,

    /// Output pepXML file; defaults to the input name with a .pepXML extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the dataset name derived from the input file name
    #[arg(long)]
    dataset: Option<String>,

    /// FASTA file path to record when the parameter file does not declare one
    #[arg(long)]
    fasta: Option<String>,

    /// Search engine parameter file
    #[arg(long)]
    params: Option<PathBuf>,

    /// Maximum hits to keep per spectrum, by score rank; 0 keeps all
    #[arg(long, default_value_t = 3)]
    hits_per_spectrum: u32,

    /// Skip peptides containing the ambiguous residue X
    #[arg(long)]
    skip_x: bool,

    /// Keep only the single best PSM per scan, ranked by MSGF SpecEValue
    #[arg(long)]
    top_hit_only: bool,

    /// Maximum proteins to report per PSM, counting the primary one; 0 keeps
    /// all
    #[arg(long, default_value_t = 0)]
    max_proteins: usize,

    /// File listing peptides to keep, one per line or first tab column
    #[arg(long)]
    peptide_filter: Option<PathBuf>,

    /// Comma-separated charge states to keep, e.g. 2,3
    #[arg(long, value_delimiter = ',')]
    charge_filter: Vec<i32>,

    /// Skip the _ModSummary and sequence info files
    #[arg(long)]
    no_mods: bool,

    /// Skip the _MSGF result file
    #[arg(long)]
    no_msgf: bool,

    /// Skip the ScanStats files
    #[arg(long)]
    no_scan_stats: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("pepXML"));

    let settings = ConversionSettings {
        input_path: args.input,
        output_path: output,
        dataset_override: args.dataset,
        fasta_path: args.fasta,
        parameter_file: args.params,
        hits_per_spectrum: args.hits_per_spectrum,
        skip_x: args.skip_x,
        top_hit_only: args.top_hit_only,
        max_proteins_per_psm: args.max_proteins,
        peptide_filter_file: args.peptide_filter,
        charge_filter: args.charge_filter,
        phrp_options: PhrpOptions {
            load_mods_and_seq_info: !args.no_mods,
            load_msgf_results: !args.no_msgf,
            load_scan_stats: !args.no_scan_stats,
        },
    };

    match convert(&settings) {
        Ok(report) => {
            for event in &report.events {
                match event.severity {
                    EventSeverity::Warning => eprintln!("Warning: {}", event.message),
                    EventSeverity::Error => eprintln!("Error: {}", event.message),
                }
            }
            println!(
                "Wrote {} spectra ({} PSMs) to {}",
                report.spectra_written,
                report.psms_written,
                settings.output_path.display()
            );
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}
