//! Search-engine parameter metadata declared in the pepXML `search_summary`,
//! and the reconciliation pass that keeps the declared modification list in
//! agreement with the modifications actually observed on cached PSMs.

use indexmap::IndexMap;

use crate::psm::{ModificationDefinition, PsmRecord};

/// Parameters describing how the upstream search was run. Loaded once from
/// the search engine's parameter file, reconciled against the cached PSMs,
/// then treated read-only by the writer.
#[derive(Debug, Clone)]
pub struct SearchEngineParameters {
    pub engine_name: String,
    pub engine_version: String,
    /// `monoisotopic` or `average`
    pub precursor_mass_type: String,
    pub fragment_mass_type: String,
    pub enzyme: String,
    /// Minimum number of enzymatic termini required by the search
    pub min_number_termini: i32,
    pub max_num_internal_cleavages: i32,
    pub fasta_file_path: String,
    /// Raw parameter key/value pairs in file order
    pub parameters: IndexMap<String, String>,
    /// Declared modifications, kept de-duplicated by [`Self::add_modification`]
    pub modifications: Vec<ModificationDefinition>,
}

impl Default for SearchEngineParameters {
    fn default() -> Self {
        Self {
            engine_name: String::new(),
            engine_version: String::new(),
            precursor_mass_type: String::from("monoisotopic"),
            fragment_mass_type: String::from("monoisotopic"),
            enzyme: String::from("trypsin"),
            min_number_termini: 2,
            max_num_internal_cleavages: 4,
            fasta_file_path: String::new(),
            parameters: IndexMap::new(),
            modifications: Vec::new(),
        }
    }
}

impl SearchEngineParameters {
    /// The engine name to report, with a placeholder when none was loaded.
    pub fn engine_name_or_default(&self) -> &str {
        if self.engine_name.is_empty() {
            "Unknown"
        } else {
            &self.engine_name
        }
    }

    /// Append `definition` unless an equivalent modification is already
    /// declared. Returns whether the list changed.
    pub fn add_modification(&mut self, definition: &ModificationDefinition) -> bool {
        if self
            .modifications
            .iter()
            .any(|known| known.equivalent(definition))
        {
            return false;
        }
        self.modifications.push(definition.clone());
        true
    }

    /// Whether a parameter file was actually loaded. Used by the writer to
    /// decide between the real parameter list and dummy placeholders.
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }
}

/// Ensure every modification observed on any cached PSM is present in the
/// declared modification list. Search engine parameter files routinely
/// under-declare modifications (or fail to parse at all); the written pepXML
/// must still declare everything it reports on its PSMs. Idempotent.
pub fn reconcile_modifications<'a>(
    psms: impl Iterator<Item = &'a PsmRecord>,
    params: &mut SearchEngineParameters,
) {
    for psm in psms {
        for modified in &psm.modified_residues {
            params.add_modification(&modified.definition);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::psm::{ModificationType, ModifiedResidue, TerminusState};

    fn oxidation() -> ModificationDefinition {
        ModificationDefinition::new(15.9949, '*', ModificationType::Dynamic, "M", "Plus1Oxy")
    }

    fn alkylation() -> ModificationDefinition {
        ModificationDefinition::new(57.02146, '-', ModificationType::Static, "C", "IodoAcet")
    }

    fn psm_with_mods(mods: Vec<ModificationDefinition>) -> PsmRecord {
        let mut psm = PsmRecord::default();
        psm.modified_residues = mods
            .into_iter()
            .enumerate()
            .map(|(i, definition)| ModifiedResidue {
                residue: 'M',
                position: i + 1,
                terminus_state: TerminusState::None,
                definition,
            })
            .collect();
        psm
    }

    #[test]
    fn test_add_modification_dedups() {
        let mut params = SearchEngineParameters::default();
        assert!(params.add_modification(&oxidation()));
        assert!(!params.add_modification(&oxidation()));
        assert!(params.add_modification(&alkylation()));
        assert_eq!(params.modifications.len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let psms = vec![
            psm_with_mods(vec![oxidation()]),
            psm_with_mods(vec![oxidation(), alkylation()]),
        ];
        let mut params = SearchEngineParameters::default();
        params.add_modification(&alkylation());

        reconcile_modifications(psms.iter(), &mut params);
        assert_eq!(params.modifications.len(), 2);

        reconcile_modifications(psms.iter(), &mut params);
        assert_eq!(params.modifications.len(), 2);
    }
}
