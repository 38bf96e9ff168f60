//! Line parsers that turn captured process output into records

use crate::record::{OutputRecord, OutputStream};

pub mod json;

pub use json::JsonRecordParser;

/// Trait for parsing process output
pub trait LineParser: Send + Sync {
    /// Parse a single line of output.
    ///
    /// Never fails: a line that cannot be decoded is kept as raw text.
    fn parse(&mut self, line: &str, stream: OutputStream) -> OutputRecord;
}

/// How a captured stream should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// External process: stdout and stderr lines verbatim
    Raw,
    /// Script interpreter: structured record lines on stdout
    Script,
}

/// Create a parser for the given kind
pub fn create_parser(kind: ParserKind) -> Box<dyn LineParser> {
    match kind {
        ParserKind::Raw => Box::new(RawLineParser),
        ParserKind::Script => Box::new(JsonRecordParser::new()),
    }
}

/// Parser that keeps every line as stream output
pub struct RawLineParser;

impl LineParser for RawLineParser {
    fn parse(&mut self, line: &str, stream: OutputStream) -> OutputRecord {
        match stream {
            OutputStream::Stdout => OutputRecord::Stdout {
                line: line.to_string(),
            },
            OutputStream::Stderr => OutputRecord::Stderr {
                line: line.to_string(),
            },
        }
    }
}
