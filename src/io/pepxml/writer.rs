//! A single-pass pepXML writer. The document header and search summary are
//! written when the writer is constructed; each spectrum group is then
//! streamed out by one [`PepXMLWriter::write_spectrum`] call, and
//! [`PepXMLWriter::close`] unwinds the open container elements.

use std::collections::BTreeMap;
use std::io;
use std::io::{BufWriter, Write};

use chrono::Local;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Error as XMLError;
use quick_xml::Writer;

use thiserror::Error;

use crate::events::ConversionEvent;
use crate::params::SearchEngineParameters;
use crate::psm::{
    is_terminal_symbol, ModificationType, PsmRecord, SeqToProteinMap, TerminusState,
    C_TERMINAL_PEPTIDE_SYMBOL, C_TERMINAL_PROTEIN_SYMBOL, N_TERMINAL_PROTEIN_SYMBOL,
};
use crate::scores::score_name_or_verbatim;
use crate::spectrum::{normalize_collision_mode, SpectrumInfo};
use crate::utils::{
    format_fixed, format_signed, parse_f64_or_default, residue_mass, C_TERMINUS_MASS,
    DEFAULT_MASS_DIGITS, MASS_DIFF_DIGITS, N_TERMINUS_MASS, RETENTION_TIME_DIGITS,
};

const BUFFER_SIZE: usize = 10000;

const PEPXML_NAMESPACE: &str = "http://regis-web.systemsbiology.net/pepXML";
const PEPXML_SCHEMA_LOCATION: &str = "http://regis-web.systemsbiology.net/pepXML \
     http://sashimi.sourceforge.net/schema_revision/pepXML/pepXML_v117.xsd";
const STYLESHEET_PI: &str = r#"xml-stylesheet type="text/xsl" href="pepXML_std.xsl""#;

// The converter reports FASTA files under a canonical database share,
// keeping only the filename from the declared path.
const DATABASE_ROOT: &str = r"C:\Database";

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let key = $name.as_bytes();
        let value = $value.as_bytes();
        $elt.push_attribute((key, value));
    };
}

macro_rules! start_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::Start($target.borrow()))?;
    };
}

macro_rules! end_event {
    ($writer:ident, $target:ident) => {
        $writer.handle.write_event(Event::End($target.to_end()))?;
    };
}

#[derive(Debug, Error)]
pub enum PepXMLWriterError {
    #[error("An XML error {0:?} was encountered")]
    XmlError(#[from] XMLError),
    #[error("Attempted an invalid transition from {from_state:?} to {to_state:?}")]
    StateTransitionError {
        from_state: PepXMLWriterState,
        to_state: PepXMLWriterState,
    },
    #[error("An IO error {0} was encountered")]
    IoError(#[from] io::Error),
    #[error("Performed an invalid action while in state {0:?}")]
    InvalidActionError(PepXMLWriterState),
}

pub type WriterResult = Result<(), PepXMLWriterError>;

/// The states a [`PepXMLWriter`] passes through while writing a document.
/// Only useful to the module consumer for working out where something went
/// wrong.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum PepXMLWriterState {
    Start,
    Header,
    SearchSummary,
    SpectrumQueries,
    Closed,
}

struct InnerXMLWriter<W: io::Write> {
    pub handle: Writer<BufWriter<W>>,
}

impl<W: io::Write> InnerXMLWriter<W> {
    pub fn new(file: W) -> InnerXMLWriter<W> {
        let handle = BufWriter::with_capacity(BUFFER_SIZE, file);
        Self {
            handle: Writer::new_with_indent(handle, b' ', 2),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.get_mut().flush()
    }

    pub fn write_event(&mut self, event: Event) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }
}

/// Caller-supplied knobs for the writer that are not part of the search
/// parameters themselves.
#[derive(Debug, Clone, Default)]
pub struct WriterSettings {
    /// Value of the `summary_xml` attribute, normally the output file path
    pub summary_xml: String,
    /// FASTA path to report when the parameter file did not declare one
    pub fasta_path_fallback: String,
    /// Cap on proteins reported per PSM, counting the primary one; 0 means
    /// unlimited
    pub max_proteins_per_psm: usize,
}

/// Writes a complete pepXML document to a wrapped stream, one spectrum query
/// at a time. Not safe to share across threads; a conversion run owns exactly
/// one writer.
pub struct PepXMLWriter<W: Write> {
    pub state: PepXMLWriterState,
    /// Number of `spectrum_query` elements written so far
    pub spectrum_counter: u64,

    dataset: String,
    params: SearchEngineParameters,
    seq_to_proteins: SeqToProteinMap,
    settings: WriterSettings,

    handle: InnerXMLWriter<W>,
}

impl<W: Write> PepXMLWriter<W> {
    /// Wrap `file` and immediately write the document header and search
    /// summary. After this returns the writer only accepts spectrum queries.
    pub fn new(
        file: W,
        dataset: impl Into<String>,
        params: SearchEngineParameters,
        seq_to_proteins: SeqToProteinMap,
        settings: WriterSettings,
    ) -> Result<Self, PepXMLWriterError> {
        let mut writer = Self {
            state: PepXMLWriterState::Start,
            spectrum_counter: 0,
            dataset: dataset.into(),
            params,
            seq_to_proteins,
            settings,
            handle: InnerXMLWriter::new(file),
        };
        writer.write_header()?;
        writer.write_search_summary()?;
        Ok(writer)
    }

    fn transition_err(&self, to_state: PepXMLWriterState) -> WriterResult {
        Err(PepXMLWriterError::StateTransitionError {
            from_state: self.state,
            to_state,
        })
    }

    fn write_header(&mut self) -> WriterResult {
        if self.state > PepXMLWriterState::Start {
            return self.transition_err(PepXMLWriterState::Header);
        }
        self.handle
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("ASCII"), None)))?;
        self.handle
            .write_event(Event::PI(BytesText::from_escaped(STYLESHEET_PI)))?;

        let date = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();

        let mut root = bstart!("msms_pipeline_analysis");
        attrib!("date", date, root);
        attrib!("summary_xml", self.settings.summary_xml, root);
        attrib!("xmlns", PEPXML_NAMESPACE, root);
        attrib!(
            "xmlns:xsi",
            "http://www.w3.org/2001/XMLSchema-instance",
            root
        );
        attrib!("xsi:schemaLocation", PEPXML_SCHEMA_LOCATION, root);
        self.handle.write_event(Event::Start(root))?;

        let mut summary = bstart!("analysis_summary");
        let engine = self.params.engine_name_or_default().to_string();
        attrib!("analysis", engine, summary);
        attrib!("time", date, summary);
        if !self.params.engine_version.is_empty() {
            attrib!("version", self.params.engine_version, summary);
        }
        self.handle.write_event(Event::Empty(summary))?;

        let mut run = bstart!("msms_run_summary");
        attrib!("base_name", self.dataset, run);
        attrib!("raw_data_type", "raw", run);
        attrib!("raw_data", ".mzXML", run);
        self.handle.write_event(Event::Start(run))?;

        self.state = PepXMLWriterState::Header;
        Ok(())
    }

    fn write_search_summary(&mut self) -> WriterResult {
        if self.state != PepXMLWriterState::Header {
            return self.transition_err(PepXMLWriterState::SearchSummary);
        }
        self.write_sample_enzyme()?;

        let mut summary = bstart!("search_summary");
        attrib!("base_name", self.dataset, summary);
        let engine = self.params.engine_name_or_default().to_string();
        attrib!("search_engine", engine, summary);
        attrib!("precursor_mass_type", self.params.precursor_mass_type, summary);
        attrib!("fragment_mass_type", self.params.fragment_mass_type, summary);
        attrib!("search_id", "1", summary);
        self.handle.write_event(Event::Start(summary.borrow()))?;

        let fasta = self.resolve_fasta_path();
        if !fasta.is_empty() {
            let mut database = bstart!("search_database");
            attrib!("local_path", fasta, database);
            attrib!("type", "AA", database);
            self.handle.write_event(Event::Empty(database))?;
        }

        let mut constraint = bstart!("enzymatic_search_constraint");
        attrib!("enzyme", self.params.enzyme, constraint);
        let max_cleavages = self.params.max_num_internal_cleavages.to_string();
        attrib!("max_num_internal_cleavages", max_cleavages, constraint);
        let min_termini = self.params.min_number_termini.to_string();
        attrib!("min_number_termini", min_termini, constraint);
        self.handle.write_event(Event::Empty(constraint))?;

        self.write_modification_declarations()?;
        self.write_parameter_list()?;

        self.handle.write_event(Event::End(summary.to_end()))?;
        self.state = PepXMLWriterState::SearchSummary;
        Ok(())
    }

    fn write_sample_enzyme(&mut self) -> WriterResult {
        let mut enzyme = bstart!("sample_enzyme");
        attrib!("name", self.params.enzyme, enzyme);
        self.handle.write_event(Event::Start(enzyme.borrow()))?;

        // Always declares tryptic specificity, whatever the enzyme says.
        // Preserved from the original converter for output compatibility.
        let mut specificity = bstart!("specificity");
        attrib!("cut", "KR", specificity);
        attrib!("no_cut", "P", specificity);
        attrib!("sense", "C", specificity);
        self.handle.write_event(Event::Empty(specificity))?;

        self.handle.write_event(Event::End(enzyme.to_end()))?;
        Ok(())
    }

    /// Report the FASTA file under the canonical database root, keeping only
    /// the filename from the declared path; fall back to the caller-supplied
    /// path when the parameter file declared none.
    fn resolve_fasta_path(&self) -> String {
        let declared = self.params.fasta_file_path.trim();
        if declared.is_empty() {
            return self.settings.fasta_path_fallback.clone();
        }
        let filename = declared
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(declared);
        format!("{}\\{}", DATABASE_ROOT, filename)
    }

    fn write_modification_declarations(&mut self) -> WriterResult {
        for definition in &self.params.modifications {
            let variable = if definition.mod_type.is_variable() {
                "Y"
            } else {
                "N"
            };
            for target in definition.target_residues.chars() {
                if is_terminal_symbol(target) {
                    continue;
                }
                let mut elt = bstart!("aminoacid_modification");
                let aminoacid = target.to_string();
                attrib!("aminoacid", aminoacid, elt);
                let massdiff = format_signed(definition.mass, MASS_DIFF_DIGITS);
                attrib!("massdiff", massdiff, elt);
                let total = residue_mass(target).unwrap_or(0.0) + definition.mass;
                let mass = format_fixed(total, MASS_DIFF_DIGITS);
                attrib!("mass", mass, elt);
                attrib!("variable", variable, elt);
                if definition.mod_type == ModificationType::Dynamic && definition.symbol != '-' {
                    let symbol = definition.symbol.to_string();
                    attrib!("symbol", symbol, elt);
                }
                self.handle.write_event(Event::Empty(elt))?;
            }
            for target in definition.target_residues.chars() {
                if !is_terminal_symbol(target) {
                    continue;
                }
                let mut elt = bstart!("terminal_modification");
                let terminus = if matches!(
                    target,
                    C_TERMINAL_PEPTIDE_SYMBOL | C_TERMINAL_PROTEIN_SYMBOL
                ) {
                    "c"
                } else {
                    "n"
                };
                attrib!("terminus", terminus, elt);
                let massdiff = format_signed(definition.mass, MASS_DIFF_DIGITS);
                attrib!("massdiff", massdiff, elt);
                let base = if terminus == "n" {
                    N_TERMINUS_MASS
                } else {
                    C_TERMINUS_MASS
                };
                let mass = format_fixed(base + definition.mass, MASS_DIFF_DIGITS);
                attrib!("mass", mass, elt);
                attrib!("variable", variable, elt);
                let protein_terminus = if matches!(
                    target,
                    N_TERMINAL_PROTEIN_SYMBOL | C_TERMINAL_PROTEIN_SYMBOL
                ) {
                    "Y"
                } else {
                    "N"
                };
                attrib!("protein_terminus", protein_terminus, elt);
                self.handle.write_event(Event::Empty(elt))?;
            }
        }
        Ok(())
    }

    fn write_parameter_list(&mut self) -> WriterResult {
        if self.params.has_parameters() {
            for (name, value) in &self.params.parameters {
                let mut param = bstart!("parameter");
                attrib!("name", name, param);
                attrib!("value", value, param);
                self.handle.write_event(Event::Empty(param))?;
            }
        } else {
            self.handle.write_event(Event::Comment(BytesText::new(
                " Dummy search parameters: the search engine parameter file was not loaded ",
            )))?;
            for (name, value) in [
                ("peptide_mass_tolerance", "3.000"),
                ("fragment_ion_tolerance", "0.000"),
            ] {
                let mut param = bstart!("parameter");
                attrib!("name", name, param);
                attrib!("value", value, param);
                self.handle.write_event(Event::Empty(param))?;
            }
        }
        Ok(())
    }

    /// Write one `spectrum_query` element for a spectrum group and its PSMs.
    /// Data-quality anomalies found along the way are appended to `events`.
    pub fn write_spectrum(
        &mut self,
        info: &SpectrumInfo,
        psms: &[PsmRecord],
        events: &mut Vec<ConversionEvent>,
    ) -> WriterResult {
        match self.state {
            PepXMLWriterState::SearchSummary | PepXMLWriterState::SpectrumQueries => {}
            state => return Err(PepXMLWriterError::InvalidActionError(state)),
        }
        self.state = PepXMLWriterState::SpectrumQueries;

        let mut query = bstart!("spectrum_query");
        attrib!("spectrum", info.name, query);
        let start_scan = info.scan_start.to_string();
        attrib!("start_scan", start_scan, query);
        let end_scan = info.scan_end.to_string();
        attrib!("end_scan", end_scan, query);
        let precursor = format_fixed(info.precursor_neutral_mass, DEFAULT_MASS_DIGITS);
        attrib!("precursor_neutral_mass", precursor, query);
        let charge = info.assumed_charge.to_string();
        attrib!("assumed_charge", charge, query);
        let index = info.index.to_string();
        attrib!("index", index, query);
        let retention = format_fixed(info.elution_time_minutes * 60.0, RETENTION_TIME_DIGITS);
        attrib!("retention_time_sec", retention, query);
        if let Some(method) = normalize_collision_mode(&info.collision_mode) {
            attrib!("activation_method", method, query);
        }
        attrib!("spectrumNativeID", info.native_id, query);
        self.handle.write_event(Event::Start(query.borrow()))?;

        let result = bstart!("search_result");
        start_event!(self, result);
        for psm in psms {
            self.write_search_hit(psm, events)?;
        }
        end_event!(self, result);

        self.handle.write_event(Event::End(query.to_end()))?;
        self.spectrum_counter += 1;
        Ok(())
    }

    fn write_search_hit(
        &mut self,
        psm: &PsmRecord,
        events: &mut Vec<ConversionEvent>,
    ) -> WriterResult {
        let mut hit = bstart!("search_hit");
        let rank = psm.score_rank.to_string();
        attrib!("hit_rank", rank, hit);
        attrib!("peptide", psm.clean_sequence, hit);
        let prev = psm.prefix.to_string();
        attrib!("peptide_prev_aa", prev, hit);
        let next = psm.suffix.to_string();
        attrib!("peptide_next_aa", next, hit);
        let protein = psm.first_protein().unwrap_or("").to_string();
        attrib!("protein", protein, hit);
        let total_proteins = psm.proteins.len().max(1).to_string();
        attrib!("num_tot_proteins", total_proteins, hit);
        let calc_mass = format_fixed(psm.peptide_monoisotopic_mass, DEFAULT_MASS_DIGITS);
        attrib!("calc_neutral_pep_mass", calc_mass, hit);
        let massdiff = format_signed(
            parse_f64_or_default(&psm.mass_error_da),
            MASS_DIFF_DIGITS,
        );
        attrib!("massdiff", massdiff, hit);
        let ntt = psm.num_tryptic_termini.to_string();
        attrib!("num_tol_term", ntt, hit);
        let missed = psm.num_missed_cleavages.to_string();
        attrib!("num_missed_cleavages", missed, hit);
        attrib!("is_rejected", "0", hit);
        if psm.peptide_with_mods != psm.clean_sequence {
            attrib!("peptide_with_mods", psm.peptide_with_mods, hit);
        }
        self.handle.write_event(Event::Start(hit.borrow()))?;

        self.write_alternative_proteins(psm)?;
        if !psm.modified_residues.is_empty() {
            self.write_modification_info(psm, events)?;
        }
        self.write_scores(psm)?;

        self.handle.write_event(Event::End(hit.to_end()))?;
        Ok(())
    }

    fn write_alternative_proteins(&mut self, psm: &PsmRecord) -> WriterResult {
        let cap = self.settings.max_proteins_per_psm;
        let seq_proteins = psm
            .seq_id
            .and_then(|seq_id| self.seq_to_proteins.get(&seq_id));
        for (n, protein) in psm.proteins.iter().enumerate().skip(1) {
            if cap != 0 && n >= cap {
                break;
            }
            // refine the termini count for this specific protein when the
            // sequence map knows about it
            let ntt = seq_proteins
                .and_then(|entries| {
                    entries
                        .iter()
                        .find(|entry| &entry.protein == protein)
                        .map(|entry| entry.cleavage_state.num_tolerant_termini())
                })
                .unwrap_or(psm.num_tryptic_termini);

            let mut elt = bstart!("alternative_protein");
            attrib!("protein", protein, elt);
            let ntt = ntt.to_string();
            attrib!("num_tol_term", ntt, elt);
            self.handle.write_event(Event::Empty(elt))?;
        }
        Ok(())
    }

    fn write_modification_info(
        &mut self,
        psm: &PsmRecord,
        events: &mut Vec<ConversionEvent>,
    ) -> WriterResult {
        let mut nterm_addon = 0.0f64;
        let mut cterm_addon = 0.0f64;
        let mut mass_by_position: BTreeMap<usize, f64> = BTreeMap::new();

        for modified in &psm.modified_residues {
            match modified.definition.mod_type {
                ModificationType::Terminal | ModificationType::ProteinTerminal => {
                    match modified.terminus_state {
                        TerminusState::PeptideNTerm | TerminusState::ProteinNTerm => {
                            nterm_addon += modified.definition.mass
                        }
                        TerminusState::PeptideCTerm | TerminusState::ProteinCTerm => {
                            cterm_addon += modified.definition.mass
                        }
                        TerminusState::None => {
                            events.push(ConversionEvent::warning(format!(
                                "Terminal modification {} on {} has no terminus state; skipped",
                                modified.definition.mass_correction_tag, psm.clean_sequence
                            )));
                        }
                    }
                }
                _ => {
                    *mass_by_position.entry(modified.position).or_default() +=
                        modified.definition.mass;
                }
            }
        }

        let residues: Vec<char> = psm.clean_sequence.chars().collect();
        let mut info = bstart!("modification_info");
        if nterm_addon.abs() > f32::EPSILON as f64 {
            let mass = format_signed(N_TERMINUS_MASS + nterm_addon, MASS_DIFF_DIGITS);
            attrib!("mod_nterm_mass", mass, info);
        }
        if cterm_addon.abs() > f32::EPSILON as f64 {
            let mass = format_signed(C_TERMINUS_MASS + cterm_addon, MASS_DIFF_DIGITS);
            attrib!("mod_cterm_mass", mass, info);
        }
        self.handle.write_event(Event::Start(info.borrow()))?;

        for (position, mod_mass) in mass_by_position {
            let residue = residues.get(position - 1).copied().unwrap_or('-');
            let total = residue_mass(residue).unwrap_or(0.0) + mod_mass;
            let mut elt = bstart!("mod_aminoacid_mass");
            let position = position.to_string();
            attrib!("position", position, elt);
            let mass = format_fixed(total, MASS_DIFF_DIGITS);
            attrib!("mass", mass, elt);
            self.handle.write_event(Event::Empty(elt))?;
        }

        self.handle.write_event(Event::End(info.to_end()))?;
        Ok(())
    }

    fn write_scores(&mut self, psm: &PsmRecord) -> WriterResult {
        for (name, value) in &psm.additional_scores {
            let mut elt = bstart!("search_score");
            let name = score_name_or_verbatim(name);
            attrib!("name", name, elt);
            attrib!("value", value, elt);
            self.handle.write_event(Event::Empty(elt))?;
        }

        let mut elt = bstart!("search_score");
        attrib!("name", "msgfspecprob", elt);
        attrib!("value", psm.msgf_spec_evalue, elt);
        self.handle.write_event(Event::Empty(elt))?;

        let mut elt = bstart!("search_score");
        attrib!("name", "MassErrorPPM", elt);
        attrib!("value", psm.mass_error_ppm, elt);
        self.handle.write_event(Event::Empty(elt))?;

        let abs_ppm = parse_f64_or_default(&psm.mass_error_ppm).abs();
        let mut elt = bstart!("search_score");
        attrib!("name", "AbsMassErrorPPM", elt);
        let value = format_fixed(abs_ppm, DEFAULT_MASS_DIGITS);
        attrib!("value", value, elt);
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    /// Unwind `msms_run_summary` and `msms_pipeline_analysis` and flush the
    /// stream. Idempotent; further spectrum writes are rejected.
    pub fn close(&mut self) -> WriterResult {
        if self.state == PepXMLWriterState::Closed {
            return Ok(());
        }
        let run = bstart!("msms_run_summary");
        end_event!(self, run);
        let root = bstart!("msms_pipeline_analysis");
        end_event!(self, root);
        self.handle.flush()?;
        self.state = PepXMLWriterState::Closed;
        Ok(())
    }

    /// Recover the wrapped stream, closing the document first if needed.
    pub fn into_inner(mut self) -> Result<W, PepXMLWriterError> {
        self.close()?;
        self.handle
            .handle
            .into_inner()
            .into_inner()
            .map_err(|err| PepXMLWriterError::IoError(err.into_error()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::{FilterSettings, PsmCache};
    use crate::params::reconcile_modifications;
    use crate::psm::{ModificationDefinition, ModifiedResidue};

    fn test_psm(rank: i32) -> PsmRecord {
        PsmRecord {
            peptide_with_mods: String::from("ACDEFGHIK"),
            clean_sequence: String::from("ACDEFGHIK"),
            prefix: 'R',
            suffix: 'L',
            proteins: vec![String::from("ProtA")],
            peptide_monoisotopic_mass: 1004.4815,
            mass_error_da: String::from("0.001"),
            mass_error_ppm: String::from("0.65"),
            charge: 2,
            scan_start: 100,
            scan_end: 100,
            collision_mode: String::from("HCD"),
            score_rank: rank,
            num_tryptic_termini: 2,
            msgf_spec_evalue: String::from("1e-10"),
            additional_scores: vec![(String::from("XCorr"), String::from("3.5"))],
            ..Default::default()
        }
    }

    fn render(
        params: SearchEngineParameters,
        settings: WriterSettings,
        groups: Vec<(SpectrumInfo, Vec<PsmRecord>)>,
    ) -> String {
        let mut events = Vec::new();
        let mut writer = PepXMLWriter::new(
            Vec::new(),
            "DatasetA",
            params,
            SeqToProteinMap::new(),
            settings,
        )
        .unwrap();
        for (info, psms) in &groups {
            writer.write_spectrum(info, psms, &mut events).unwrap();
        }
        let buffer = writer.into_inner().unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn info_for(psm: &PsmRecord) -> SpectrumInfo {
        SpectrumInfo::from_psm("DatasetA", psm, 0)
    }

    #[test]
    fn test_document_skeleton() {
        let text = render(
            SearchEngineParameters::default(),
            WriterSettings::default(),
            vec![(info_for(&test_psm(1)), vec![test_psm(1)])],
        );
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"ASCII\"?>"));
        assert!(text.contains("pepXML_std.xsl"));
        assert!(text.contains("<msms_pipeline_analysis"));
        assert!(text.contains("base_name=\"DatasetA\""));
        assert!(text.contains("<specificity cut=\"KR\" no_cut=\"P\" sense=\"C\"/>"));
        assert!(text.contains("spectrum=\"DatasetA.100.100.2\""));
        assert!(text.contains("activation_method=\"HCD\""));
        assert!(text.trim_end().ends_with("</msms_pipeline_analysis>"));
        // no parameter file loaded: placeholders and a comment are written
        assert!(text.contains("Dummy search parameters"));
        assert!(text.contains("name=\"peptide_mass_tolerance\""));
    }

    #[test]
    fn test_hit_cap_end_to_end() {
        let settings = FilterSettings {
            hits_per_spectrum: 2,
            ..Default::default()
        };
        let mut cache = PsmCache::new("DatasetA", settings);
        cache.cache_records(vec![test_psm(1), test_psm(2), test_psm(3)].into_iter());

        let mut params = SearchEngineParameters::default();
        reconcile_modifications(cache.iter_psms(), &mut params);

        let mut events = Vec::new();
        let mut writer = PepXMLWriter::new(
            Vec::new(),
            "DatasetA",
            params,
            SeqToProteinMap::new(),
            WriterSettings::default(),
        )
        .unwrap();
        for (key, psms) in cache.psms() {
            let info = cache.spectra().get(key).unwrap();
            writer.write_spectrum(info, psms, &mut events).unwrap();
        }
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(text.matches("<spectrum_query").count(), 1);
        assert_eq!(text.matches("<search_hit").count(), 2);
        assert!(text.contains("hit_rank=\"1\""));
        assert!(text.contains("hit_rank=\"2\""));
        assert!(!text.contains("hit_rank=\"3\""));
    }

    #[test]
    fn test_max_proteins_suppresses_alternatives() {
        let mut psm = test_psm(1);
        psm.proteins = vec![
            String::from("ProtA"),
            String::from("ProtB"),
            String::from("ProtC"),
        ];
        let settings = WriterSettings {
            max_proteins_per_psm: 1,
            ..Default::default()
        };
        let text = render(
            SearchEngineParameters::default(),
            settings,
            vec![(info_for(&psm), vec![psm.clone()])],
        );
        assert!(text.contains("protein=\"ProtA\""));
        assert!(!text.contains("<alternative_protein"));

        // unlimited writes both alternatives
        let text = render(
            SearchEngineParameters::default(),
            WriterSettings::default(),
            vec![(info_for(&psm), vec![psm])],
        );
        assert_eq!(text.matches("<alternative_protein").count(), 2);
        assert!(text.contains("protein=\"ProtB\""));
        assert!(text.contains("protein=\"ProtC\""));
    }

    #[test]
    fn test_unparsable_ppm_yields_zero_abs_error() {
        let mut psm = test_psm(1);
        psm.mass_error_ppm = String::from("abc");
        let text = render(
            SearchEngineParameters::default(),
            WriterSettings::default(),
            vec![(info_for(&psm), vec![psm])],
        );
        assert!(text.contains("name=\"AbsMassErrorPPM\" value=\"0.0000\""));
    }

    #[test]
    fn test_unknown_collision_mode_omits_activation() {
        let mut psm = test_psm(1);
        psm.collision_mode = String::from("unknown-mode");
        let text = render(
            SearchEngineParameters::default(),
            WriterSettings::default(),
            vec![(info_for(&psm), vec![psm])],
        );
        assert!(!text.contains("activation_method"));
    }

    #[test]
    fn test_score_translation_and_fixed_scores() {
        let text = render(
            SearchEngineParameters::default(),
            WriterSettings::default(),
            vec![(info_for(&test_psm(1)), vec![test_psm(1)])],
        );
        assert!(text.contains("name=\"xcorr\" value=\"3.5\""));
        assert!(text.contains("name=\"msgfspecprob\" value=\"1e-10\""));
        assert!(text.contains("name=\"MassErrorPPM\" value=\"0.65\""));
        assert!(text.contains("name=\"AbsMassErrorPPM\" value=\"0.6500\""));
    }

    #[test]
    fn test_modification_info_block() {
        let oxidation =
            ModificationDefinition::new(15.9949, '*', ModificationType::Dynamic, "M", "Plus1Oxy");
        let acetyl = ModificationDefinition::new(
            42.01057,
            '-',
            ModificationType::Terminal,
            "<",
            "Acetyl",
        );
        let mut psm = test_psm(1);
        psm.peptide_with_mods = String::from("ACDEFGHM*K");
        psm.clean_sequence = String::from("ACDEFGHMK");
        psm.modified_residues = vec![
            ModifiedResidue {
                residue: 'M',
                position: 8,
                terminus_state: TerminusState::None,
                definition: oxidation.clone(),
            },
            ModifiedResidue {
                residue: 'A',
                position: 1,
                terminus_state: TerminusState::PeptideNTerm,
                definition: acetyl.clone(),
            },
        ];
        let mut params = SearchEngineParameters::default();
        params.add_modification(&oxidation);
        params.add_modification(&acetyl);

        let text = render(
            params,
            WriterSettings::default(),
            vec![(info_for(&psm), vec![psm])],
        );
        // declared in the search summary
        assert!(text.contains("<aminoacid_modification aminoacid=\"M\" massdiff=\"+15.99490\""));
        assert!(text.contains("<terminal_modification terminus=\"n\" massdiff=\"+42.01057\""));
        // annotated form differs from the clean form
        assert!(text.contains("peptide_with_mods=\"ACDEFGHM*K\""));
        // per-PSM block: oxidized methionine and the N-terminal addon
        let expected_mass = format_fixed(131.04049 + 15.9949, MASS_DIFF_DIGITS);
        assert!(text.contains(&format!(
            "<mod_aminoacid_mass position=\"8\" mass=\"{}\"/>",
            expected_mass
        )));
        let expected_nterm = format_signed(N_TERMINUS_MASS + 42.01057, MASS_DIFF_DIGITS);
        assert!(text.contains(&format!("mod_nterm_mass=\"{}\"", expected_nterm)));
    }

    #[test]
    fn test_terminal_mod_without_state_warns() {
        let acetyl = ModificationDefinition::new(
            42.01057,
            '-',
            ModificationType::Terminal,
            "<",
            "Acetyl",
        );
        let mut psm = test_psm(1);
        psm.modified_residues = vec![ModifiedResidue {
            residue: 'A',
            position: 1,
            terminus_state: TerminusState::None,
            definition: acetyl,
        }];

        let mut events = Vec::new();
        let mut writer = PepXMLWriter::new(
            Vec::new(),
            "DatasetA",
            SearchEngineParameters::default(),
            SeqToProteinMap::new(),
            WriterSettings::default(),
        )
        .unwrap();
        writer
            .write_spectrum(&info_for(&psm), &[psm], &mut events)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("no terminus state"));
        writer.close().unwrap();
    }

    #[test]
    fn test_write_after_close_is_invalid() {
        let psm = test_psm(1);
        let mut events = Vec::new();
        let mut writer = PepXMLWriter::new(
            Vec::new(),
            "DatasetA",
            SearchEngineParameters::default(),
            SeqToProteinMap::new(),
            WriterSettings::default(),
        )
        .unwrap();
        writer.close().unwrap();
        // closing twice is a no-op
        writer.close().unwrap();
        let err = writer
            .write_spectrum(&info_for(&psm), &[psm], &mut events)
            .unwrap_err();
        assert!(matches!(err, PepXMLWriterError::InvalidActionError(_)));
    }

    #[test]
    fn test_fasta_path_rewrite() {
        let params = SearchEngineParameters {
            fasta_file_path: String::from("/remote/share/proteins_2024.fasta"),
            ..Default::default()
        };
        let text = render(
            params,
            WriterSettings::default(),
            vec![(info_for(&test_psm(1)), vec![test_psm(1)])],
        );
        assert!(text.contains("local_path=\"C:\\Database\\proteins_2024.fasta\""));
    }
}
