//! Reader for PHRP tab-delimited synopsis files and the auxiliary files that
//! travel alongside them (modification summary, sequence info, MSGF scores,
//! scan stats, search engine parameters).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::events::ConversionEvent;
use crate::io::ConverterError;
use crate::params::SearchEngineParameters;
use crate::psm::{
    clean_sequence, is_terminal_symbol, split_annotated_sequence, strip_mod_symbols,
    CleavageState, ModificationDefinition, ModificationType, ModifiedResidue, PsmRecord,
    SeqProtein, SeqToProteinMap, TerminusState, C_TERMINAL_PEPTIDE_SYMBOL,
    C_TERMINAL_PROTEIN_SYMBOL, N_TERMINAL_PEPTIDE_SYMBOL, N_TERMINAL_PROTEIN_SYMBOL,
};
use crate::utils::PROTON;

/// Tool tags PHRP appends to the dataset name when writing synopsis files,
/// with the engine each one identifies.
const TOOL_TAGS: &[(&str, &str)] = &[
    ("_msgfplus", "MSGF+"),
    ("_msgfdb", "MSGFDB"),
    ("_sequest", "SEQUEST"),
    ("_xt", "X!Tandem"),
    ("_inspect", "Inspect"),
    ("_msalign", "MSAlign"),
];

/// Case-insensitive column lookup for a tab-delimited header row.
#[derive(Debug, Default)]
struct ColumnMap {
    /// lowercased name -> column index
    index: HashMap<String, usize>,
    /// original header names in file order
    names: Vec<String>,
}

impl ColumnMap {
    fn parse(header: &str) -> Self {
        let mut index = HashMap::new();
        let mut names = Vec::new();
        for (i, name) in header.split('\t').enumerate() {
            let name = name.trim();
            index.insert(name.to_ascii_lowercase(), i);
            names.push(name.to_string());
        }
        Self { index, names }
    }

    /// Index of the first matching column among `candidates`.
    fn get(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|name| self.index.get(&name.to_ascii_lowercase()))
            .copied()
    }

    fn field<'a>(&self, row: &'a [&'a str], candidates: &[&str]) -> &'a str {
        self.get(candidates)
            .and_then(|i| row.get(i))
            .map_or("", |v| v.trim())
    }
}

fn parse_i32_or(text: &str, default: i32) -> i32 {
    text.trim().parse().unwrap_or(default)
}

/// Count internal K/R residues not followed by proline.
fn count_missed_cleavages(clean: &str) -> i32 {
    let residues: Vec<char> = clean.chars().collect();
    let mut count = 0;
    for window in residues.windows(2) {
        if matches!(window[0], 'K' | 'R') && window[1] != 'P' {
            count += 1;
        }
    }
    count
}

/// Streaming reader for one PHRP synopsis file. Yields `(result_id, record)`
/// pairs; the result ID joins the record against the auxiliary maps.
pub struct PhrpReader<R: io::Read> {
    handle: BufReader<R>,
    columns: ColumnMap,
    line_number: usize,
}

impl<R: io::Read> PhrpReader<R> {
    /// Wrap `source` and consume its header row.
    pub fn new(source: R) -> Result<Self, ConverterError> {
        let mut handle = BufReader::new(source);
        let mut header = String::new();
        handle.read_line(&mut header)?;
        let columns = ColumnMap::parse(header.trim_end());
        if columns.get(&["peptide"]).is_none() {
            return Err(ConverterError::InvalidHeader(String::from(
                "no Peptide column",
            )));
        }
        Ok(Self {
            handle,
            columns,
            line_number: 1,
        })
    }

    /// Read the next data row, if any. Rows that cannot be split into enough
    /// columns are skipped with a logged warning.
    pub fn read_next(&mut self) -> Option<(i32, PsmRecord)> {
        let mut buffer = String::new();
        loop {
            buffer.clear();
            match self.handle.read_line(&mut buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    warn!("IO error reading synopsis file: {}", err);
                    return None;
                }
            }
            self.line_number += 1;
            let line = buffer.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }
            match self.parse_row(line) {
                Some(parsed) => return Some(parsed),
                None => {
                    warn!("Skipping malformed row at line {}", self.line_number);
                }
            }
        }
    }

    fn parse_row(&self, line: &str) -> Option<(i32, PsmRecord)> {
        let row: Vec<&str> = line.split('\t').collect();
        let columns = &self.columns;
        if row.len() < 2 {
            return None;
        }

        let peptide_raw = columns.field(&row, &["Peptide"]);
        if peptide_raw.is_empty() {
            return None;
        }
        let (prefix, core, suffix) = split_annotated_sequence(peptide_raw);
        let clean = strip_mod_symbols(&core);

        let result_id = parse_i32_or(columns.field(&row, &["ResultID", "Result_ID"]), 0);
        let scan_start = parse_i32_or(
            columns.field(&row, &["Scan", "ScanNum", "Scan Number", "StartScan"]),
            0,
        );
        let scan_end = parse_i32_or(columns.field(&row, &["EndScan"]), scan_start);
        let charge = parse_i32_or(columns.field(&row, &["Charge", "ChargeState"]), 1);

        // M+H is the common convention across engines; a neutral mass column
        // wins when present
        let neutral_mass = {
            let direct = columns.field(&row, &["MonoisotopicMass", "Calc_Neutral_Pep_Mass"]);
            if direct.is_empty() {
                let mh: f64 = columns
                    .field(&row, &["MH", "Calc_MH", "MH(Da)"])
                    .parse()
                    .unwrap_or(0.0);
                if mh > 0.0 {
                    mh - PROTON
                } else {
                    0.0
                }
            } else {
                direct.parse().unwrap_or(0.0)
            }
        };

        let missed = columns.get(&["MissedCleavages", "NumMissedCleavages"]).map_or_else(
            || count_missed_cleavages(&clean),
            |i| parse_i32_or(row.get(i).copied().unwrap_or(""), 0),
        );

        let rank = parse_i32_or(
            columns.field(
                &row,
                &[
                    "Rank_MSGFDB_SpecEValue",
                    "Rank_MSGF_SpecEValue",
                    "RankXc",
                    "RankHit",
                    "Rank",
                ],
            ),
            1,
        );

        let ntt = parse_i32_or(columns.field(&row, &["NTT", "NumTrypticEnds"]), 2);

        // every column not consumed above is carried through as a score
        let consumed: HashSet<usize> = [
            columns.get(&["Peptide"]),
            columns.get(&["ResultID", "Result_ID"]),
            columns.get(&["Scan", "ScanNum", "Scan Number", "StartScan"]),
            columns.get(&["EndScan"]),
            columns.get(&["Charge", "ChargeState"]),
            columns.get(&["MonoisotopicMass", "Calc_Neutral_Pep_Mass"]),
            columns.get(&["MH", "Calc_MH", "MH(Da)"]),
            columns.get(&["MissedCleavages", "NumMissedCleavages"]),
            columns.get(&["NTT", "NumTrypticEnds"]),
            columns.get(&["DelM", "DelM_Da"]),
            columns.get(&["DelM_PPM", "DelMPPM"]),
            columns.get(&["Protein", "Reference"]),
            columns.get(&["FragMethod", "CollisionMode"]),
            columns.get(&["Dataset"]),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut additional_scores = Vec::new();
        for (i, name) in columns.names.iter().enumerate() {
            if consumed.contains(&i) {
                continue;
            }
            if let Some(value) = row.get(i) {
                let value = value.trim();
                if !value.is_empty() {
                    additional_scores.push((name.clone(), value.to_string()));
                }
            }
        }

        let protein = columns.field(&row, &["Protein", "Reference"]).to_string();
        let proteins = if protein.is_empty() {
            Vec::new()
        } else {
            vec![protein]
        };

        let record = PsmRecord {
            peptide_with_mods: core,
            clean_sequence: clean,
            prefix,
            suffix,
            proteins,
            peptide_monoisotopic_mass: neutral_mass,
            mass_error_da: columns.field(&row, &["DelM", "DelM_Da"]).to_string(),
            mass_error_ppm: columns.field(&row, &["DelM_PPM", "DelMPPM"]).to_string(),
            charge,
            scan_start,
            scan_end,
            elution_time_minutes: 0.0,
            collision_mode: columns.field(&row, &["FragMethod", "CollisionMode"]).to_string(),
            score_rank: rank,
            num_missed_cleavages: missed,
            num_tryptic_termini: ntt.clamp(0, 2) as u8,
            seq_id: None,
            msgf_spec_evalue: String::new(),
            additional_scores,
            modified_residues: Vec::new(),
        };
        Some((result_id, record))
    }
}

/// Scan-level values loaded from `_ScanStatsEx.txt`.
#[derive(Debug, Clone, Default)]
pub struct ScanStatsEntry {
    pub elution_time_minutes: f64,
    pub collision_mode: String,
}

/// Auxiliary data joined onto PSM records after the synopsis row is parsed.
#[derive(Debug, Default)]
pub struct AuxiliaryData {
    pub modifications: Vec<ModificationDefinition>,
    pub result_to_seq: HashMap<i32, i32>,
    /// SeqID -> PHRP `Mod_Description`, e.g. `Plus1Oxy:4,IodoAcet:7`
    pub seq_mod_descriptions: HashMap<i32, String>,
    pub seq_to_proteins: SeqToProteinMap,
    /// Result ID -> MSGF SpecEValue string, verbatim
    pub msgf_values: HashMap<i32, String>,
    pub scan_stats: HashMap<i32, ScanStatsEntry>,
}

fn open_tabular(path: &Path) -> io::Result<(ColumnMap, impl Iterator<Item = Vec<String>>)> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let columns = ColumnMap::parse(header.trim_end());
    let rows = reader.lines().map_while(Result::ok).filter_map(|line| {
        if line.trim().is_empty() {
            None
        } else {
            Some(line.split('\t').map(|v| v.trim().to_string()).collect())
        }
    });
    Ok((columns, rows))
}

impl AuxiliaryData {
    /// Load `_ModSummary.txt`: the modification definitions the search used.
    pub fn load_mod_summary(&mut self, path: &Path) -> Result<(), ConverterError> {
        if !path.is_file() {
            return Err(ConverterError::ModSummaryFileNotFound(
                path.display().to_string(),
            ));
        }
        let (columns, rows) = open_tabular(path)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let symbol = columns
                .field(&row, &["Modification_Symbol"])
                .chars()
                .next()
                .unwrap_or('-');
            let mass: f64 = columns
                .field(&row, &["Modification_Mass"])
                .parse()
                .unwrap_or(0.0);
            let targets = columns.field(&row, &["Target_Residues"]).to_string();
            let mod_type = ModificationType::from_code(
                columns
                    .field(&row, &["Modification_Type"])
                    .chars()
                    .next()
                    .unwrap_or('U'),
            );
            let tag = columns.field(&row, &["Mass_Correction_Tag"]).to_string();
            self.modifications.push(ModificationDefinition::new(
                mass, symbol, mod_type, targets, tag,
            ));
        }
        debug!(
            "Loaded {} modification definitions from {}",
            self.modifications.len(),
            path.display()
        );
        Ok(())
    }

    /// Load the SeqInfo trio: result -> SeqID, SeqID -> mod description, and
    /// SeqID -> protein/cleavage-state list.
    pub fn load_seq_info(
        &mut self,
        result_to_seq: &Path,
        seq_info: &Path,
        seq_to_protein: &Path,
    ) -> Result<(), ConverterError> {
        for required in [result_to_seq, seq_info, seq_to_protein] {
            if !required.is_file() {
                return Err(ConverterError::SeqInfoFileNotFound(
                    required.display().to_string(),
                ));
            }
        }

        let (columns, rows) = open_tabular(result_to_seq)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let result_id = parse_i32_or(columns.field(&row, &["Result_ID", "ResultID"]), -1);
            let seq_id = parse_i32_or(columns.field(&row, &["Unique_Seq_ID", "SeqID"]), -1);
            if result_id >= 0 && seq_id >= 0 {
                self.result_to_seq.insert(result_id, seq_id);
            }
        }

        let (columns, rows) = open_tabular(seq_info)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let seq_id = parse_i32_or(columns.field(&row, &["Unique_Seq_ID", "SeqID"]), -1);
            let description = columns.field(&row, &["Mod_Description"]);
            if seq_id >= 0 && !description.is_empty() {
                self.seq_mod_descriptions
                    .insert(seq_id, description.to_string());
            }
        }

        let (columns, rows) = open_tabular(seq_to_protein)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let seq_id = parse_i32_or(columns.field(&row, &["Unique_Seq_ID", "SeqID"]), -1);
            let protein = columns.field(&row, &["Protein_Name", "Protein"]);
            if seq_id < 0 || protein.is_empty() {
                continue;
            }
            let cleavage = CleavageState::from_code(parse_i32_or(
                columns.field(&row, &["Cleavage_State"]),
                0,
            ));
            self.seq_to_proteins
                .entry(seq_id)
                .or_default()
                .push(SeqProtein {
                    protein: protein.to_string(),
                    cleavage_state: cleavage,
                });
        }
        Ok(())
    }

    /// Load `_MSGF.txt`: per-result SpecEValue strings, kept verbatim.
    pub fn load_msgf(&mut self, path: &Path) -> Result<(), ConverterError> {
        if !path.is_file() {
            return Err(ConverterError::MsgfFileNotFound(path.display().to_string()));
        }
        let (columns, rows) = open_tabular(path)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let result_id = parse_i32_or(columns.field(&row, &["Result_ID", "ResultID"]), -1);
            let value = columns.field(&row, &["SpecEValue", "SpecProb"]);
            if result_id >= 0 && !value.is_empty() {
                self.msgf_values.insert(result_id, value.to_string());
            }
        }
        Ok(())
    }

    /// Load `_ScanStatsEx.txt` (or `_ScanStats.txt`): per-scan elution time
    /// and collision mode.
    pub fn load_scan_stats(&mut self, path: &Path) -> Result<(), ConverterError> {
        if !path.is_file() {
            return Err(ConverterError::ScanStatsFileNotFound(
                path.display().to_string(),
            ));
        }
        let (columns, rows) = open_tabular(path)?;
        for row in rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            let scan = parse_i32_or(columns.field(&row, &["ScanNumber", "Scan"]), -1);
            if scan < 0 {
                continue;
            }
            let entry = self.scan_stats.entry(scan).or_default();
            let time = columns.field(&row, &["ScanTime (min)", "ScanTime", "Elution Time"]);
            if !time.is_empty() {
                entry.elution_time_minutes = time.parse().unwrap_or(0.0);
            }
            let mode = columns.field(&row, &["Collision Mode", "CollisionMode"]);
            if !mode.is_empty() {
                entry.collision_mode = mode.to_string();
            }
        }
        Ok(())
    }

    /// Join the auxiliary maps onto a freshly parsed record.
    pub fn apply(&self, result_id: i32, record: &mut PsmRecord, warnings: &mut WarningSink) {
        if let Some(value) = self.msgf_values.get(&result_id) {
            record.msgf_spec_evalue = value.clone();
        }
        if let Some(stats) = self.scan_stats.get(&record.scan_start) {
            record.elution_time_minutes = stats.elution_time_minutes;
            if record.collision_mode.is_empty() {
                record.collision_mode = stats.collision_mode.clone();
            }
        }
        if let Some(&seq_id) = self.result_to_seq.get(&result_id) {
            record.seq_id = Some(seq_id);
            if let Some(proteins) = self.seq_to_proteins.get(&seq_id) {
                for seq_protein in proteins {
                    if !record.proteins.contains(&seq_protein.protein) {
                        record.proteins.push(seq_protein.protein.clone());
                    }
                }
            }
        }
        self.attach_modifications(result_id, record, warnings);
    }

    /// Populate `record.modified_residues` from the mod description (when
    /// SeqInfo is loaded) or inline symbols, then expand static mods onto
    /// every matching residue.
    fn attach_modifications(
        &self,
        result_id: i32,
        record: &mut PsmRecord,
        warnings: &mut WarningSink,
    ) {
        if self.modifications.is_empty() {
            return;
        }
        let described = record
            .seq_id
            .and_then(|seq_id| self.seq_mod_descriptions.get(&seq_id));
        match described {
            Some(description) => {
                self.attach_from_description(description, record, warnings);
            }
            None => self.attach_from_symbols(result_id, record, warnings),
        }
        self.attach_static_mods(record);
    }

    fn attach_from_description(
        &self,
        description: &str,
        record: &mut PsmRecord,
        warnings: &mut WarningSink,
    ) {
        let residues: Vec<char> = record.clean_sequence.chars().collect();
        for item in description.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (tag, position) = match item.split_once(':') {
                Some((tag, pos)) => (tag.trim(), parse_i32_or(pos, 0) as usize),
                None => {
                    warnings.push(format!("Unparsable mod description entry '{}'", item));
                    continue;
                }
            };
            let definition = match self
                .modifications
                .iter()
                .find(|def| def.mass_correction_tag == tag)
            {
                Some(def) => def,
                None => {
                    warnings.push(format!("Mod description tag '{}' not in ModSummary", tag));
                    continue;
                }
            };
            if definition.mod_type == ModificationType::Static {
                // static mods are expanded over the sequence separately
                continue;
            }
            if position == 0 || position > residues.len() {
                warnings.push(format!(
                    "Mod position {} outside peptide of length {}",
                    position,
                    residues.len()
                ));
                continue;
            }
            record.modified_residues.push(ModifiedResidue {
                residue: residues[position - 1],
                position,
                terminus_state: terminus_state_for(definition, position, residues.len()),
                definition: definition.clone(),
            });
        }
    }

    fn attach_from_symbols(
        &self,
        result_id: i32,
        record: &mut PsmRecord,
        warnings: &mut WarningSink,
    ) {
        let mut position = 0usize;
        for symbol in record.peptide_with_mods.chars() {
            if symbol.is_ascii_alphabetic() {
                position += 1;
                continue;
            }
            let definition = self
                .modifications
                .iter()
                .find(|def| def.mod_type == ModificationType::Dynamic && def.symbol == symbol);
            match definition {
                Some(def) => {
                    let residue = record
                        .clean_sequence
                        .chars()
                        .nth(position.saturating_sub(1))
                        .unwrap_or('-');
                    record.modified_residues.push(ModifiedResidue {
                        residue,
                        position: position.max(1),
                        terminus_state: terminus_state_for(
                            def,
                            position.max(1),
                            record.clean_sequence.len(),
                        ),
                        definition: def.clone(),
                    });
                }
                None => warnings.push(format!(
                    "Result {}: modification symbol '{}' not declared in ModSummary",
                    result_id, symbol
                )),
            }
        }
    }

    fn attach_static_mods(&self, record: &mut PsmRecord) {
        let residues: Vec<char> = record.clean_sequence.chars().collect();
        if residues.is_empty() {
            return;
        }
        for definition in &self.modifications {
            match definition.mod_type {
                ModificationType::Static => {
                    for (i, residue) in residues.iter().enumerate() {
                        if definition.target_residues.contains(*residue) {
                            record.modified_residues.push(ModifiedResidue {
                                residue: *residue,
                                position: i + 1,
                                terminus_state: TerminusState::None,
                                definition: definition.clone(),
                            });
                        }
                    }
                }
                ModificationType::Terminal | ModificationType::ProteinTerminal => {
                    for target in definition.target_residues.chars() {
                        if !is_terminal_symbol(target) {
                            continue;
                        }
                        let (position, state) = match target {
                            N_TERMINAL_PEPTIDE_SYMBOL => (1, TerminusState::PeptideNTerm),
                            C_TERMINAL_PEPTIDE_SYMBOL => {
                                (residues.len(), TerminusState::PeptideCTerm)
                            }
                            N_TERMINAL_PROTEIN_SYMBOL => (1, TerminusState::ProteinNTerm),
                            _ => (residues.len(), TerminusState::ProteinCTerm),
                        };
                        // protein-terminal mods only apply at an actual
                        // protein terminus
                        if state == TerminusState::ProteinNTerm && record.prefix != '-' {
                            continue;
                        }
                        if state == TerminusState::ProteinCTerm && record.suffix != '-' {
                            continue;
                        }
                        record.modified_residues.push(ModifiedResidue {
                            residue: residues[position - 1],
                            position,
                            terminus_state: state,
                            definition: definition.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

fn terminus_state_for(
    definition: &ModificationDefinition,
    position: usize,
    length: usize,
) -> TerminusState {
    match definition.mod_type {
        ModificationType::Terminal => {
            if definition.target_residues.contains(N_TERMINAL_PEPTIDE_SYMBOL) && position == 1 {
                TerminusState::PeptideNTerm
            } else if definition.target_residues.contains(C_TERMINAL_PEPTIDE_SYMBOL)
                && position == length
            {
                TerminusState::PeptideCTerm
            } else {
                TerminusState::None
            }
        }
        ModificationType::ProteinTerminal => {
            if definition.target_residues.contains(N_TERMINAL_PROTEIN_SYMBOL) && position == 1 {
                TerminusState::ProteinNTerm
            } else if definition.target_residues.contains(C_TERMINAL_PROTEIN_SYMBOL)
                && position == length
            {
                TerminusState::ProteinCTerm
            } else {
                TerminusState::None
            }
        }
        _ => TerminusState::None,
    }
}

/// Accumulates distinct warning messages in first-seen order.
#[derive(Debug, Default)]
pub struct WarningSink {
    seen: HashSet<String>,
    events: Vec<ConversionEvent>,
}

impl WarningSink {
    pub fn push(&mut self, message: String) {
        if self.seen.insert(message.clone()) {
            warn!("{}", message);
            self.events.push(ConversionEvent::warning(message));
        }
    }

    pub fn drain(&mut self) -> Vec<ConversionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Which auxiliary files to load alongside the synopsis file.
#[derive(Debug, Clone, Copy)]
pub struct PhrpOptions {
    pub load_mods_and_seq_info: bool,
    pub load_msgf_results: bool,
    pub load_scan_stats: bool,
}

impl Default for PhrpOptions {
    fn default() -> Self {
        Self {
            load_mods_and_seq_info: true,
            load_msgf_results: true,
            load_scan_stats: true,
        }
    }
}

/// A synopsis file plus its sibling auxiliary files, ready to stream fully
/// joined PSM records.
pub struct PhrpSource {
    pub dataset: String,
    pub engine_name: String,
    reader: PhrpReader<fs::File>,
    aux: AuxiliaryData,
    warnings: WarningSink,
}

impl PhrpSource {
    /// Open `path` and whichever auxiliary siblings the options request.
    /// Requested-but-missing auxiliary files abort the run; the ScanStatsEx
    /// fallback to plain ScanStats is the one tolerated substitution.
    pub fn open(path: &Path, options: PhrpOptions) -> Result<Self, ConverterError> {
        let reader = PhrpReader::new(fs::File::open(path)?)?;
        let (dataset, engine_name) = dataset_and_engine(path);

        let base = path.with_extension("");
        let sibling = |suffix: &str| -> PathBuf {
            let mut name = base.file_name().map_or_else(String::new, |n| {
                n.to_string_lossy().into_owned()
            });
            name.push_str(suffix);
            base.with_file_name(name)
        };

        let mut aux = AuxiliaryData::default();
        if options.load_mods_and_seq_info {
            aux.load_mod_summary(&sibling("_ModSummary.txt"))?;
            aux.load_seq_info(
                &sibling("_ResultToSeqMap.txt"),
                &sibling("_SeqInfo.txt"),
                &sibling("_SeqToProteinMap.txt"),
            )?;
        }
        if options.load_msgf_results {
            aux.load_msgf(&sibling("_MSGF.txt"))?;
        }
        if options.load_scan_stats {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            let extended = parent.join(format!("{}_ScanStatsEx.txt", dataset));
            let plain = parent.join(format!("{}_ScanStats.txt", dataset));
            if extended.is_file() {
                aux.load_scan_stats(&extended)?;
            } else {
                aux.load_scan_stats(&plain)?;
            }
        }

        Ok(Self {
            dataset,
            engine_name,
            reader,
            aux,
            warnings: WarningSink::default(),
        })
    }

    pub fn seq_to_proteins(&self) -> &SeqToProteinMap {
        &self.aux.seq_to_proteins
    }

    /// Hand the SeqID -> protein map off to the writer once reading is done.
    pub fn take_seq_to_proteins(&mut self) -> SeqToProteinMap {
        std::mem::take(&mut self.aux.seq_to_proteins)
    }

    /// Distinct warnings gathered while joining records, draining the list.
    pub fn take_warnings(&mut self) -> Vec<ConversionEvent> {
        self.warnings.drain()
    }
}

impl Iterator for PhrpSource {
    type Item = PsmRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let (result_id, mut record) = self.reader.read_next()?;
        self.aux.apply(result_id, &mut record, &mut self.warnings);
        Some(record)
    }
}

/// Derive the dataset name and search engine from a synopsis file name by
/// stripping the `_syn` suffix and any tool tag before it.
fn dataset_and_engine(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let mut dataset = stem
        .strip_suffix("_syn")
        .or_else(|| stem.strip_suffix("_fht"))
        .unwrap_or(&stem)
        .to_string();
    let mut engine = String::new();
    for (tag, name) in TOOL_TAGS {
        if let Some(prefix) = dataset.strip_suffix(tag) {
            dataset = prefix.to_string();
            engine = (*name).to_string();
            break;
        }
    }
    (dataset, engine)
}

/// Load a `key=value` search engine parameter file. Lines that do not parse
/// are skipped with a warning; a few well-known keys are promoted to the
/// structured fields.
pub fn load_search_engine_params(
    path: &Path,
    engine_name: &str,
) -> Result<SearchEngineParameters, ConverterError> {
    if !path.is_file() {
        return Err(ConverterError::ParameterFileNotFound(
            path.display().to_string(),
        ));
    }
    let mut params = SearchEngineParameters {
        engine_name: engine_name.to_string(),
        ..Default::default()
    };
    let reader = BufReader::new(fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            warn!("Skipping unparsable parameter line: {}", trimmed);
            continue;
        };
        let key = key.trim();
        // strip a trailing same-line comment
        let value = value.split('#').next().unwrap_or("").trim();
        match key.to_ascii_lowercase().as_str() {
            "enzymename" | "enzyme" => params.enzyme = value.to_string(),
            "ntt" | "numtolerabletermini" => {
                params.min_number_termini = parse_i32_or(value, params.min_number_termini)
            }
            "maxmissedcleavages" => {
                params.max_num_internal_cleavages =
                    parse_i32_or(value, params.max_num_internal_cleavages)
            }
            "fastafile" | "databasefile" | "database_name" => {
                params.fasta_file_path = value.to_string()
            }
            _ => {}
        }
        params.parameters.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
