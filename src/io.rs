//! Reading PHRP tab-delimited result files and writing pepXML.

use std::io;

use thiserror::Error;

pub mod pepxml;
pub mod phrp;

pub use crate::io::pepxml::{PepXMLWriter, PepXMLWriterError, PepXMLWriterState};
pub use crate::io::phrp::{AuxiliaryData, PhrpReader, PhrpSource};

/// Errors that abort a conversion run. Each missing input category gets its
/// own variant so callers can report a distinct error code.
#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("Peptide filter file not found: {0}")]
    PeptideFilterFileNotFound(String),
    #[error("Modification summary file not found: {0}")]
    ModSummaryFileNotFound(String),
    #[error("Sequence info file not found: {0}")]
    SeqInfoFileNotFound(String),
    #[error("MSGF result file not found: {0}")]
    MsgfFileNotFound(String),
    #[error("Scan stats file not found: {0}")]
    ScanStatsFileNotFound(String),
    #[error("Search engine parameter file not found: {0}")]
    ParameterFileNotFound(String),
    #[error("Input file {0} has no recognizable header line")]
    InvalidHeader(String),
    #[error("Cannot open output file {path}: {source}")]
    OutputFileError { path: String, source: io::Error },
    #[error("IO error {0} was encountered")]
    IoError(#[from] io::Error),
    #[error("pepXML writer error: {0}")]
    WriterError(#[from] PepXMLWriterError),
}
