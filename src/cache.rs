//! The aggregation pass: consume a stream of PSM records, apply the
//! configured filters, and group the survivors by spectrum key ready for
//! serialization.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info};

use crate::io::ConverterError;
use crate::psm::{clean_sequence, PsmRecord};
use crate::spectrum::{spectrum_key, SpectrumInfo};

const PROGRESS_INTERVAL: usize = 5000;

/// Per-record filters applied by the cache, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FilterSettings {
    /// Drop PSMs whose clean sequence contains residue `X`
    pub skip_x: bool,
    /// Keep only hits whose score rank is at or below this cap; 0 = unlimited
    pub hits_per_spectrum: u32,
    /// When non-empty, keep only PSMs whose clean sequence is in this set
    pub peptide_allow_list: HashSet<String>,
    /// When non-empty, keep only PSMs with one of these charges
    pub charge_allow_list: HashSet<i32>,
    /// Collapse each scan to its single best PSM by MSGF SpecEValue
    pub top_hit_only: bool,
}

impl FilterSettings {
    /// Whether `psm` passes every active filter. The filters compose as
    /// independent AND gates.
    fn retain(&self, psm: &PsmRecord) -> bool {
        if self.skip_x && psm.clean_sequence.contains('X') {
            return false;
        }
        if self.hits_per_spectrum > 0 && psm.score_rank > self.hits_per_spectrum as i32 {
            return false;
        }
        if !self.peptide_allow_list.is_empty()
            && !self.peptide_allow_list.contains(&psm.clean_sequence)
        {
            return false;
        }
        if !self.charge_allow_list.is_empty() && !self.charge_allow_list.contains(&psm.charge) {
            return false;
        }
        true
    }
}

/// Load a peptide allow-list: one peptide per line, or a tab-delimited row
/// whose first column is the peptide. Each entry is reduced to its clean
/// sequence before insertion. A missing file fails the whole run.
pub fn load_peptide_filter_file(path: &Path) -> Result<HashSet<String>, ConverterError> {
    if !path.is_file() {
        return Err(ConverterError::PeptideFilterFileNotFound(
            path.display().to_string(),
        ));
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut peptides = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        let first = line.split('\t').next().unwrap_or("").trim();
        if first.is_empty() {
            continue;
        }
        peptides.insert(clean_sequence(first));
    }
    info!("Loaded {} peptides from {}", peptides.len(), path.display());
    Ok(peptides)
}

/// Filtered PSMs grouped by spectrum key. Two parallel insertion-ordered
/// maps: spectrum metadata (snapshotted from the first PSM per key) and the
/// PSM lists themselves.
#[derive(Debug, Default)]
pub struct PsmCache {
    dataset: String,
    settings: FilterSettings,
    spectra: IndexMap<String, SpectrumInfo>,
    psms: IndexMap<String, Vec<PsmRecord>>,
}

impl PsmCache {
    pub fn new(dataset: impl Into<String>, settings: FilterSettings) -> Self {
        Self {
            dataset: dataset.into(),
            settings,
            spectra: IndexMap::new(),
            psms: IndexMap::new(),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Spectrum metadata by key, in first-observation order.
    pub fn spectra(&self) -> &IndexMap<String, SpectrumInfo> {
        &self.spectra
    }

    /// PSM lists by spectrum key.
    pub fn psms(&self) -> &IndexMap<String, Vec<PsmRecord>> {
        &self.psms
    }

    /// All retained PSMs in storage order, for the reconciliation pass.
    pub fn iter_psms(&self) -> impl Iterator<Item = &PsmRecord> {
        self.psms.values().flatten()
    }

    /// Number of distinct spectrum keys with at least one retained PSM.
    pub fn len(&self) -> usize {
        self.psms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.psms.is_empty()
    }

    /// Run the full aggregation pass over `records`, then collapse to top
    /// hits if that mode is enabled. Returns the number of retained PSMs.
    pub fn cache_records(&mut self, records: impl Iterator<Item = PsmRecord>) -> usize {
        let mut seen = 0usize;
        let mut retained = 0usize;
        for psm in records {
            seen += 1;
            if self.add_record(psm) {
                retained += 1;
            }
            if seen % PROGRESS_INTERVAL == 0 {
                info!("Caching PSMs: {} records read", seen);
            }
        }
        debug!(
            "Cached {} of {} PSMs across {} spectra",
            retained,
            seen,
            self.spectra.len()
        );
        if self.settings.top_hit_only {
            self.collapse_to_top_hits();
        }
        retained
    }

    /// Apply the filters to one record and, if it survives, group it under
    /// its spectrum key. The first record for a key snapshots the spectrum
    /// metadata and claims the next sequential index.
    pub fn add_record(&mut self, psm: PsmRecord) -> bool {
        if !self.settings.retain(&psm) {
            return false;
        }
        let key = spectrum_key(&self.dataset, psm.scan_start, psm.scan_end, psm.charge);
        if !self.spectra.contains_key(&key) {
            let info = SpectrumInfo::from_psm(&self.dataset, &psm, self.spectra.len());
            self.spectra.insert(key.clone(), info);
        }
        self.psms.entry(key).or_default().push(psm);
        true
    }

    /// Rebuild the PSM map to hold exactly one PSM per raw start scan: the
    /// one with the lowest MSGF SpecEValue, keyed by that PSM's original
    /// spectrum key. The collapse deliberately ignores charge, so multiple
    /// charge states for a scan merge into a single entry. Ties (including
    /// the unparsable-value sentinel) keep the first PSM seen.
    fn collapse_to_top_hits(&mut self) {
        let mut best_by_scan: HashMap<i32, (f64, String, PsmRecord)> = HashMap::new();
        let mut scan_order: Vec<i32> = Vec::new();

        for (key, psms) in &self.psms {
            for psm in psms {
                let value = psm.msgf_spec_evalue_or_worst();
                match best_by_scan.get(&psm.scan_start) {
                    Some((best, _, _)) if value >= *best => {}
                    Some(_) => {
                        best_by_scan
                            .insert(psm.scan_start, (value, key.clone(), psm.clone()));
                    }
                    None => {
                        scan_order.push(psm.scan_start);
                        best_by_scan
                            .insert(psm.scan_start, (value, key.clone(), psm.clone()));
                    }
                }
            }
        }

        let mut collapsed: IndexMap<String, Vec<PsmRecord>> =
            IndexMap::with_capacity(scan_order.len());
        for scan in scan_order {
            if let Some((_, key, psm)) = best_by_scan.remove(&scan) {
                collapsed.insert(key, vec![psm]);
            }
        }
        debug!(
            "Top-hit collapse reduced {} spectrum entries to {}",
            self.psms.len(),
            collapsed.len()
        );
        self.psms = collapsed;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn psm(scan: i32, charge: i32, rank: i32, sequence: &str) -> PsmRecord {
        PsmRecord {
            clean_sequence: sequence.to_string(),
            peptide_with_mods: sequence.to_string(),
            charge,
            scan_start: scan,
            scan_end: scan,
            score_rank: rank,
            peptide_monoisotopic_mass: 1000.0 + scan as f64,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_psm_sets_metadata() {
        let mut cache = PsmCache::new("DatasetA", FilterSettings::default());
        let mut first = psm(100, 2, 1, "ACDEFGHIK");
        first.elution_time_minutes = 12.5;
        let mut second = psm(100, 2, 2, "ACDEFGHIR");
        second.elution_time_minutes = 99.9;
        second.peptide_monoisotopic_mass = 1.0;

        cache.cache_records(vec![first, second].into_iter());

        let info = cache.spectra().get("DatasetA.100.100.2").unwrap();
        assert_eq!(info.elution_time_minutes, 12.5);
        assert_eq!(info.precursor_neutral_mass, 1100.0);
        assert_eq!(info.index, 0);
        assert_eq!(cache.psms().get("DatasetA.100.100.2").unwrap().len(), 2);
    }

    #[test]
    fn test_sequential_indexes() {
        let mut cache = PsmCache::new("DatasetA", FilterSettings::default());
        cache.cache_records(
            vec![psm(100, 2, 1, "AAAK"), psm(101, 2, 1, "CCCK"), psm(100, 2, 2, "DDDK")]
                .into_iter(),
        );
        assert_eq!(cache.spectra().get("DatasetA.100.100.2").unwrap().index, 0);
        assert_eq!(cache.spectra().get("DatasetA.101.101.2").unwrap().index, 1);
        assert_eq!(cache.spectra().len(), 2);
    }

    #[test]
    fn test_filters_compose_as_and_gates() {
        let settings = FilterSettings {
            skip_x: true,
            hits_per_spectrum: 2,
            peptide_allow_list: ["ACDEFGHIK".to_string(), "MMMK".to_string()]
                .into_iter()
                .collect(),
            charge_allow_list: [2].into_iter().collect(),
            top_hit_only: false,
        };
        let mut cache = PsmCache::new("DatasetA", settings);

        // passes everything
        assert!(cache.add_record(psm(100, 2, 1, "ACDEFGHIK")));
        // contains X
        assert!(!cache.add_record(psm(100, 2, 1, "ACXEFGHIK")));
        // rank over cap
        assert!(!cache.add_record(psm(100, 2, 3, "ACDEFGHIK")));
        // not in allow list
        assert!(!cache.add_record(psm(100, 2, 1, "WWWK")));
        // charge not allowed
        assert!(!cache.add_record(psm(100, 3, 1, "ACDEFGHIK")));
    }

    #[test]
    fn test_top_hit_collapse() {
        let settings = FilterSettings {
            top_hit_only: true,
            ..Default::default()
        };
        let mut cache = PsmCache::new("DatasetA", settings);

        let mut a = psm(100, 2, 1, "AAAK");
        a.msgf_spec_evalue = String::from("1e-5");
        let mut b = psm(100, 3, 1, "CCCK");
        b.msgf_spec_evalue = String::from("1e-10");
        let mut c = psm(100, 4, 1, "DDDK");
        c.msgf_spec_evalue = String::from("not-a-number");

        cache.cache_records(vec![a, b, c].into_iter());

        // one entry for the scan, keyed by the winner's charge-3 key
        assert_eq!(cache.psms().len(), 1);
        let (key, psms) = cache.psms().iter().next().unwrap();
        assert_eq!(key, "DatasetA.100.100.3");
        assert_eq!(psms.len(), 1);
        assert_eq!(psms[0].clean_sequence, "CCCK");
        // metadata map keeps all three spectra
        assert_eq!(cache.spectra().len(), 3);
    }

    #[test]
    fn test_top_hit_sentinel_ties_keep_first() {
        let settings = FilterSettings {
            top_hit_only: true,
            ..Default::default()
        };
        let mut cache = PsmCache::new("DatasetA", settings);
        let first = psm(200, 2, 1, "AAAK");
        let second = psm(200, 3, 1, "CCCK");
        cache.cache_records(vec![first, second].into_iter());

        let (key, psms) = cache.psms().iter().next().unwrap();
        assert_eq!(key, "DatasetA.200.200.2");
        assert_eq!(psms[0].clean_sequence, "AAAK");
    }

    #[test]
    fn test_load_peptide_filter_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "R.AC*DEFGHIK.L\textra column").unwrap();
        writeln!(file, "MMMK").unwrap();
        writeln!(file).unwrap();
        let peptides = load_peptide_filter_file(file.path()).unwrap();
        assert_eq!(peptides.len(), 2);
        assert!(peptides.contains("ACDEFGHIK"));
        assert!(peptides.contains("MMMK"));
    }

    #[test]
    fn test_missing_filter_file_is_fatal() {
        let err = load_peptide_filter_file(Path::new("/no/such/file.txt")).unwrap_err();
        assert!(matches!(err, ConverterError::PeptideFilterFileNotFound(_)));
    }
}
