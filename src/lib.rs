//! Convert PHRP tab-delimited peptide identification results into pepXML.
//!
//! The crate reads a PHRP synopsis file together with its sibling auxiliary
//! files (modification summary, sequence info, MSGF scores, scan stats),
//! aggregates the peptide-spectrum matches by spectrum, and streams a pepXML
//! document that downstream proteomics tools can consume.
//!
//! The high-level entry point is [`converter::convert`]; the pieces it wires
//! together are usable on their own:
//!
//! - [`io::phrp`] streams joined [`psm::PsmRecord`]s from the input files
//! - [`cache::PsmCache`] filters and groups them by spectrum key
//! - [`params`] reconciles declared and observed modifications
//! - [`io::pepxml`] serializes the document one spectrum query at a time

pub mod cache;
pub mod converter;
pub mod events;
pub mod io;
pub mod params;
pub mod psm;
pub mod scores;
pub mod spectrum;
pub mod utils;

pub use crate::cache::{FilterSettings, PsmCache};
pub use crate::converter::{convert, ConversionReport, ConversionSettings};
pub use crate::events::{ConversionEvent, EventSeverity};
pub use crate::io::pepxml::{PepXMLWriter, PepXMLWriterError, WriterSettings};
pub use crate::io::phrp::{PhrpOptions, PhrpSource};
pub use crate::io::ConverterError;
pub use crate::params::SearchEngineParameters;
pub use crate::psm::{ModificationDefinition, ModificationType, PsmRecord};
pub use crate::spectrum::SpectrumInfo;
