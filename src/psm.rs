//! The peptide-spectrum match (PSM) record model produced by the PHRP reader
//! and consumed read-only by the aggregation pass and the pepXML writer.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Symbol marking a peptide N-terminus in a modification target list.
pub const N_TERMINAL_PEPTIDE_SYMBOL: char = '<';
/// Symbol marking a peptide C-terminus in a modification target list.
pub const C_TERMINAL_PEPTIDE_SYMBOL: char = '>';
/// Symbol marking a protein N-terminus in a modification target list.
pub const N_TERMINAL_PROTEIN_SYMBOL: char = '[';
/// Symbol marking a protein C-terminus in a modification target list.
pub const C_TERMINAL_PROTEIN_SYMBOL: char = ']';

/// The kind of modification described by a [`ModificationDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModificationType {
    /// Variable modification, present on some instances of a residue
    Dynamic,
    /// Fixed modification, applied to every instance of a residue
    Static,
    /// Fixed modification of a peptide terminus
    Terminal,
    /// Fixed modification of a protein terminus
    ProteinTerminal,
    #[default]
    Unknown,
}

impl ModificationType {
    /// Parse the one-letter type code used by PHRP `_ModSummary.txt` files.
    pub fn from_code(code: char) -> Self {
        match code.to_ascii_uppercase() {
            'D' => Self::Dynamic,
            'S' => Self::Static,
            'T' => Self::Terminal,
            'P' => Self::ProteinTerminal,
            _ => Self::Unknown,
        }
    }

    /// Whether the pepXML `variable` attribute should be `Y` for this type.
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// A modification that a search recognized, with the residues it targets.
#[derive(Debug, Clone, Default)]
pub struct ModificationDefinition {
    /// Monoisotopic mass delta
    pub mass: f64,
    /// One-letter symbol used inline in annotated peptide sequences, `'-'`
    /// for static modifications which are not marked inline
    pub symbol: char,
    pub mod_type: ModificationType,
    /// The residues this modification can occur on, possibly including the
    /// terminal marker symbols
    pub target_residues: String,
    /// Human-readable mass correction tag, e.g. `Plus1Oxy`
    pub mass_correction_tag: String,
}

impl ModificationDefinition {
    pub fn new(
        mass: f64,
        symbol: char,
        mod_type: ModificationType,
        target_residues: impl Into<String>,
        mass_correction_tag: impl Into<String>,
    ) -> Self {
        Self {
            mass,
            symbol,
            mod_type,
            target_residues: target_residues.into(),
            mass_correction_tag: mass_correction_tag.into(),
        }
    }

    /// Tolerant equality used when reconciling observed modifications against
    /// the declared modification list. Matches on mass, type and target
    /// residues rather than object identity.
    pub fn equivalent(&self, other: &Self) -> bool {
        (self.mass - other.mass).abs() < 1e-6
            && self.mod_type == other.mod_type
            && self.target_residues == other.target_residues
    }

    /// Whether any target of this modification is a terminal marker symbol.
    pub fn targets_a_terminus(&self) -> bool {
        self.target_residues.chars().any(is_terminal_symbol)
    }
}

/// Whether `residue` is one of the terminal marker symbols rather than an
/// amino acid.
pub fn is_terminal_symbol(residue: char) -> bool {
    matches!(
        residue,
        N_TERMINAL_PEPTIDE_SYMBOL
            | C_TERMINAL_PEPTIDE_SYMBOL
            | N_TERMINAL_PROTEIN_SYMBOL
            | C_TERMINAL_PROTEIN_SYMBOL
    )
}

/// Where a modified residue sits relative to the peptide and protein termini.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminusState {
    #[default]
    None,
    PeptideNTerm,
    PeptideCTerm,
    ProteinNTerm,
    ProteinCTerm,
}

/// One modified residue on a PSM.
#[derive(Debug, Clone)]
pub struct ModifiedResidue {
    pub residue: char,
    /// 1-based position within the clean peptide sequence
    pub position: usize,
    pub terminus_state: TerminusState,
    pub definition: ModificationDefinition,
}

/// How well a peptide's termini agree with the expected enzymatic cleavage
/// rule. The numeric value doubles as the pepXML `num_tol_term` count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CleavageState {
    #[default]
    NonSpecific = 0,
    Partial = 1,
    Full = 2,
}

impl CleavageState {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Full,
            1 => Self::Partial,
            _ => Self::NonSpecific,
        }
    }

    pub fn num_tolerant_termini(&self) -> u8 {
        *self as u8
    }
}

/// A protein associated with a SeqID, with the cleavage state the peptide has
/// in the context of that protein.
#[derive(Debug, Clone)]
pub struct SeqProtein {
    pub protein: String,
    pub cleavage_state: CleavageState,
}

/// SeqID -> ordered protein list, used to refine the tryptic-termini count
/// reported for alternative proteins.
pub type SeqToProteinMap = HashMap<i32, Vec<SeqProtein>>;

/// A single peptide-spectrum match read from a PHRP result file, immutable
/// once constructed.
#[derive(Debug, Clone, Default)]
pub struct PsmRecord {
    /// Peptide with inline modification symbols, possibly with flanking
    /// residues, e.g. `R.AC*DEFGHIK.L`
    pub peptide_with_mods: String,
    /// Amino acid letters only
    pub clean_sequence: String,
    /// Residue preceding the peptide in the protein, `-` at a terminus
    pub prefix: char,
    /// Residue following the peptide in the protein
    pub suffix: char,
    /// All proteins containing this peptide; the first one is reported on the
    /// `search_hit` element itself
    pub proteins: Vec<String>,
    /// Monoisotopic neutral mass of the (modified) peptide
    pub peptide_monoisotopic_mass: f64,
    /// Pre-formatted mass error in Daltons; may not parse
    pub mass_error_da: String,
    /// Pre-formatted mass error in ppm; may not parse
    pub mass_error_ppm: String,
    pub charge: i32,
    pub scan_start: i32,
    pub scan_end: i32,
    /// Elution time in minutes
    pub elution_time_minutes: f64,
    /// Raw collision/activation mode reported by the instrument, e.g. `HCD`
    pub collision_mode: String,
    /// Rank of this hit among all hits for the spectrum; 1 is best
    pub score_rank: i32,
    pub num_missed_cleavages: i32,
    /// Count of peptide ends consistent with the cleavage rule (0, 1 or 2)
    pub num_tryptic_termini: u8,
    /// Identifier joining this PSM against the SeqID -> protein map
    pub seq_id: Option<i32>,
    /// MSGF SpecEValue as reported; lower is better, may not parse
    pub msgf_spec_evalue: String,
    /// Search-engine specific scores in report order
    pub additional_scores: Vec<(String, String)>,
    pub modified_residues: Vec<ModifiedResidue>,
}

impl PsmRecord {
    /// The first (reported) protein for this PSM, if any.
    pub fn first_protein(&self) -> Option<&str> {
        self.proteins.first().map(String::as_str)
    }

    /// MSGF SpecEValue parsed for comparisons. Missing or unparsable values
    /// degrade to a sentinel that never beats a real value.
    pub fn msgf_spec_evalue_or_worst(&self) -> f64 {
        self.msgf_spec_evalue
            .trim()
            .parse()
            .unwrap_or(MSGF_SPEC_EVALUE_WORST)
    }
}

/// Sentinel assigned to PSMs whose SpecEValue is absent or unparsable.
pub const MSGF_SPEC_EVALUE_WORST: f64 = 100.0;

fn annotated_sequence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z\-])\.(.+)\.([A-Za-z\-])$").unwrap())
}

/// Split an annotated peptide of the form `prefix.SEQUENCE.suffix` into its
/// flanking residues and core. A bare `SEQUENCE` yields `-` flanks.
pub fn split_annotated_sequence(annotated: &str) -> (char, String, char) {
    match annotated_sequence_re().captures(annotated) {
        Some(caps) => {
            let prefix = caps[1].chars().next().unwrap_or('-');
            let suffix = caps[3].chars().next().unwrap_or('-');
            (prefix, caps[2].to_string(), suffix)
        }
        None => ('-', annotated.to_string(), '-'),
    }
}

/// Remove inline modification symbols, leaving amino acid letters only.
pub fn strip_mod_symbols(sequence: &str) -> String {
    sequence.chars().filter(char::is_ascii_alphabetic).collect()
}

/// Reduce a raw peptide (possibly annotated, possibly carrying mod symbols)
/// to its clean sequence.
pub fn clean_sequence(peptide: &str) -> String {
    let (_, core, _) = split_annotated_sequence(peptide);
    strip_mod_symbols(&core)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_annotated_sequence() {
        let (pre, core, post) = split_annotated_sequence("R.AC*DEFGHIK.L");
        assert_eq!(pre, 'R');
        assert_eq!(core, "AC*DEFGHIK");
        assert_eq!(post, 'L');

        let (pre, core, post) = split_annotated_sequence("-.MKDEFGHIK.L");
        assert_eq!(pre, '-');
        assert_eq!(core, "MKDEFGHIK");
        assert_eq!(post, 'L');

        let (pre, core, post) = split_annotated_sequence("ACDEFGHIK");
        assert_eq!(pre, '-');
        assert_eq!(core, "ACDEFGHIK");
        assert_eq!(post, '-');
    }

    #[test]
    fn test_clean_sequence() {
        assert_eq!(clean_sequence("R.AC*DEF@GHIK.L"), "ACDEFGHIK");
        assert_eq!(clean_sequence("AC*DEFGHIK"), "ACDEFGHIK");
        assert_eq!(clean_sequence("ACDEFGHIK"), "ACDEFGHIK");
    }

    #[test]
    fn test_modification_equivalence() {
        let a = ModificationDefinition::new(15.9949, '*', ModificationType::Dynamic, "M", "Plus1Oxy");
        let mut b = a.clone();
        b.mass_correction_tag = String::from("Oxidation");
        b.symbol = '#';
        assert!(a.equivalent(&b));

        b.mass += 0.01;
        assert!(!a.equivalent(&b));

        let c = ModificationDefinition::new(15.9949, '*', ModificationType::Static, "M", "Plus1Oxy");
        assert!(!a.equivalent(&c));
    }

    #[test]
    fn test_msgf_sentinel() {
        let mut psm = PsmRecord::default();
        psm.msgf_spec_evalue = String::from("1e-10");
        assert!((psm.msgf_spec_evalue_or_worst() - 1e-10).abs() < 1e-12);
        psm.msgf_spec_evalue = String::from("not-a-number");
        assert_eq!(psm.msgf_spec_evalue_or_worst(), MSGF_SPEC_EVALUE_WORST);
        psm.msgf_spec_evalue.clear();
        assert_eq!(psm.msgf_spec_evalue_or_worst(), MSGF_SPEC_EVALUE_WORST);
    }

    #[test]
    fn test_cleavage_state() {
        assert_eq!(CleavageState::from_code(2).num_tolerant_termini(), 2);
        assert_eq!(CleavageState::from_code(0).num_tolerant_termini(), 0);
        assert_eq!(CleavageState::from_code(7), CleavageState::NonSpecific);
    }
}
