//! Spectrum-level metadata captured once per distinct spectrum, plus the key
//! and native-ID builders that identify a spectrum across the run.

use crate::psm::PsmRecord;

/// Build the stable key identifying the spectrum a PSM came from. Repeated
/// PSMs for one spectrum must produce the same key so they merge into one
/// `spectrum_query`.
pub fn spectrum_key(dataset: &str, scan_start: i32, scan_end: i32, charge: i32) -> String {
    format!("{}.{}.{}.{}", dataset, scan_start, scan_end, charge)
}

/// Synthesize the `spectrumNativeID` attribute value for a scan.
///
/// This hard-codes the Thermo raw-file numbering scheme; source spectra from
/// other instrument vendors will get an inaccurate native ID. Known
/// limitation, not configurable.
pub fn native_id(scan_number: i32) -> String {
    format!("controllerType=0 controllerNumber=1 scan={}", scan_number)
}

/// Normalize a raw collision/activation mode string to one of the activation
/// methods pepXML recognizes. Returns `None` when no activation method should
/// be written at all.
pub fn normalize_collision_mode(raw: &str) -> Option<&'static str> {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.as_str() {
        "" => return None,
        "CID" => return Some("CID"),
        "ETD" => return Some("ETD"),
        "HCD" => return Some("HCD"),
        "ETD/CID" | "ETD-CID" => return Some("ETD/CID"),
        _ => {}
    }
    if upper.starts_with("CID") {
        Some("CID")
    } else if upper.starts_with("HCD") {
        Some("HCD")
    } else if upper.starts_with("ETD") {
        Some("ETD")
    } else {
        None
    }
}

/// Metadata for one distinct spectrum, snapshotted from the first PSM
/// observed for its key. Later PSMs for the same key only contribute to the
/// PSM list, never to this record.
#[derive(Debug, Clone, Default)]
pub struct SpectrumInfo {
    /// The spectrum key, also written as the `spectrum` attribute
    pub name: String,
    pub scan_start: i32,
    pub scan_end: i32,
    pub precursor_neutral_mass: f64,
    pub assumed_charge: i32,
    /// Elution time in minutes
    pub elution_time_minutes: f64,
    pub collision_mode: String,
    /// Position of this spectrum in first-observation order, starting at 0
    pub index: usize,
    pub native_id: String,
}

impl SpectrumInfo {
    /// Capture spectrum metadata from the first PSM observed for a key.
    pub fn from_psm(dataset: &str, psm: &PsmRecord, index: usize) -> Self {
        Self {
            name: spectrum_key(dataset, psm.scan_start, psm.scan_end, psm.charge),
            scan_start: psm.scan_start,
            scan_end: psm.scan_end,
            precursor_neutral_mass: psm.peptide_monoisotopic_mass,
            assumed_charge: psm.charge,
            elution_time_minutes: psm.elution_time_minutes,
            collision_mode: psm.collision_mode.clone(),
            index,
            native_id: native_id(psm.scan_start),
        }
    }
}
