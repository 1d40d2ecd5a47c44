//! The conversion driver: wire the PHRP reader, the PSM cache, the parameter
//! reconciler and the pepXML writer together for one run.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::cache::{load_peptide_filter_file, FilterSettings, PsmCache};
use crate::events::ConversionEvent;
use crate::io::pepxml::{PepXMLWriter, WriterSettings};
use crate::io::phrp::{load_search_engine_params, PhrpOptions, PhrpSource};
use crate::io::ConverterError;
use crate::params::{reconcile_modifications, SearchEngineParameters};

/// Everything the caller configures for one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    /// PHRP synopsis file to read
    pub input_path: PathBuf,
    /// pepXML file to create
    pub output_path: PathBuf,
    /// Overrides the dataset name derived from the input file name
    pub dataset_override: Option<String>,
    /// FASTA path reported when the parameter file declares none
    pub fasta_path: Option<String>,
    /// Search engine parameter file to load
    pub parameter_file: Option<PathBuf>,
    /// Keep only hits ranked at or below this cap; 0 = unlimited
    pub hits_per_spectrum: u32,
    pub skip_x: bool,
    pub top_hit_only: bool,
    /// Cap on proteins reported per PSM; 0 = unlimited
    pub max_proteins_per_psm: usize,
    pub peptide_filter_file: Option<PathBuf>,
    pub charge_filter: Vec<i32>,
    pub phrp_options: PhrpOptions,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            output_path: PathBuf::new(),
            dataset_override: None,
            fasta_path: None,
            parameter_file: None,
            hits_per_spectrum: 3,
            skip_x: false,
            top_hit_only: false,
            max_proteins_per_psm: 0,
            peptide_filter_file: None,
            charge_filter: Vec::new(),
            phrp_options: PhrpOptions::default(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub spectra_written: u64,
    pub psms_written: usize,
    /// Data-quality warnings gathered across all phases
    pub events: Vec<ConversionEvent>,
}

/// Run one conversion end to end. Input availability problems abort with a
/// distinct error; data-quality anomalies are collected into the report.
pub fn convert(settings: &ConversionSettings) -> Result<ConversionReport, ConverterError> {
    let mut report = ConversionReport::default();

    let mut filters = FilterSettings {
        skip_x: settings.skip_x,
        hits_per_spectrum: settings.hits_per_spectrum,
        charge_allow_list: settings.charge_filter.iter().copied().collect(),
        top_hit_only: settings.top_hit_only,
        ..Default::default()
    };
    if let Some(path) = &settings.peptide_filter_file {
        filters.peptide_allow_list = load_peptide_filter_file(path)?;
    }

    let mut source = PhrpSource::open(&settings.input_path, settings.phrp_options)?;
    let dataset = settings
        .dataset_override
        .clone()
        .unwrap_or_else(|| source.dataset.clone());
    info!(
        "Converting {} (dataset {})",
        settings.input_path.display(),
        dataset
    );

    let mut cache = PsmCache::new(dataset.clone(), filters);
    let retained = cache.cache_records(&mut source);
    report.psms_written = retained;
    report.events.extend(source.take_warnings());
    if cache.is_empty() {
        warn!("No PSMs passed the configured filters");
    }

    let mut params = match &settings.parameter_file {
        Some(path) => load_search_engine_params(path, &source.engine_name)?,
        None => SearchEngineParameters {
            engine_name: source.engine_name.clone(),
            ..Default::default()
        },
    };
    reconcile_modifications(cache.iter_psms(), &mut params);

    let output = fs::File::create(&settings.output_path).map_err(|source| {
        ConverterError::OutputFileError {
            path: settings.output_path.display().to_string(),
            source,
        }
    })?;
    let writer_settings = WriterSettings {
        summary_xml: settings.output_path.display().to_string(),
        fasta_path_fallback: settings.fasta_path.clone().unwrap_or_default(),
        max_proteins_per_psm: settings.max_proteins_per_psm,
    };
    let mut writer = PepXMLWriter::new(
        output,
        dataset,
        params,
        source.take_seq_to_proteins(),
        writer_settings,
    )?;

    for (key, psms) in cache.psms() {
        let Some(info) = cache.spectra().get(key) else {
            report.events.push(ConversionEvent::warning(format!(
                "No spectrum metadata for key {}; group skipped",
                key
            )));
            continue;
        };
        writer.write_spectrum(info, psms, &mut report.events)?;
    }
    writer.close()?;
    report.spectra_written = writer.spectrum_counter;

    info!(
        "Wrote {} spectrum queries ({} PSMs) to {}",
        report.spectra_written,
        report.psms_written,
        settings.output_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_end_to_end_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("DatasetA_msgfplus_syn.txt");
        let mut file = fs::File::create(&input).unwrap();
        writeln!(
            file,
            "ResultID\tScan\tFragMethod\tCharge\tMH\tPeptide\tProtein\tNTT\tDelM\tDelM_PPM\tMSGFScore"
        )
        .unwrap();
        writeln!(
            file,
            "1\t100\tHCD\t2\t1525.7253\tR.ACDEFGHIK.L\tProtA\t2\t0.001\t0.65\t120"
        )
        .unwrap();
        writeln!(
            file,
            "2\t101\tCID\t2\t980.4410\tK.MMMDEFK.A\tProtB\t2\t-0.002\t-1.2\t88"
        )
        .unwrap();

        let output = dir.path().join("DatasetA.pepXML");
        let settings = ConversionSettings {
            input_path: input,
            output_path: output.clone(),
            phrp_options: PhrpOptions {
                load_mods_and_seq_info: false,
                load_msgf_results: false,
                load_scan_stats: false,
            },
            ..Default::default()
        };
        let report = convert(&settings).unwrap();
        assert_eq!(report.spectra_written, 2);
        assert_eq!(report.psms_written, 2);

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("base_name=\"DatasetA\""));
        assert!(text.contains("spectrum=\"DatasetA.100.100.2\""));
        assert!(text.contains("spectrum=\"DatasetA.101.101.2\""));
        assert!(text.contains("search_engine=\"MSGF+\""));
        assert!(text.trim_end().ends_with("</msms_pipeline_analysis>"));
    }

    #[test]
    fn test_missing_aux_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("DatasetB_msgfplus_syn.txt");
        let mut file = fs::File::create(&input).unwrap();
        writeln!(file, "ResultID\tScan\tCharge\tMH\tPeptide\tProtein").unwrap();
        writeln!(file, "1\t100\t2\t1525.7253\tR.ACDEFGHIK.L\tProtA").unwrap();

        let settings = ConversionSettings {
            input_path: input,
            output_path: dir.path().join("out.pepXML"),
            phrp_options: PhrpOptions {
                load_mods_and_seq_info: false,
                load_msgf_results: true,
                load_scan_stats: false,
            },
            ..Default::default()
        };
        let err = convert(&settings).unwrap_err();
        assert!(matches!(err, ConverterError::MsgfFileNotFound(_)));
    }

    #[test]
    fn test_unwritable_output_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("DatasetC_msgfplus_syn.txt");
        let mut file = fs::File::create(&input).unwrap();
        writeln!(file, "ResultID\tScan\tCharge\tMH\tPeptide\tProtein").unwrap();
        writeln!(file, "1\t100\t2\t1525.7253\tR.ACDEFGHIK.L\tProtA").unwrap();

        let settings = ConversionSettings {
            input_path: input,
            output_path: dir.path().join("missing/subdir/out.pepXML"),
            phrp_options: PhrpOptions {
                load_mods_and_seq_info: false,
                load_msgf_results: false,
                load_scan_stats: false,
            },
            ..Default::default()
        };
        let err = convert(&settings).unwrap_err();
        assert!(matches!(err, ConverterError::OutputFileError { .. }));
    }
}
