//! Streaming event classification
//!
//! Provider-agnostic: the parser sees only text chunks, so any backend that
//! can emit the marker vocabulary in [`markers`] gets typed events for free.

pub mod markers;
pub mod parser;

pub use markers::{Segment, TRUNCATION_MARKER};
pub use parser::{
    parse_parameters, truncate_payload, ParserConfig, ParserOutput, ParserState,
    StreamEventParser, DEFAULT_TOOL_RESULT_CAP,
};
