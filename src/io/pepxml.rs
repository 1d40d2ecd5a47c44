//! Streaming pepXML document writing.

mod writer;

pub use writer::{
    PepXMLWriter, PepXMLWriterError, PepXMLWriterState, WriterResult, WriterSettings,
};
