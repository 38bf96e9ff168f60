use super::LineParser;
use crate::record::{OutputRecord, OutputStream};

/// Parser for script interpreter output.
///
/// Scripts report diagnostics by printing one JSON record per line, e.g.
/// `{"kind":"warning","message":"disk almost full"}`. Anything else on
/// stdout is an ordinary value; stderr is native command output.
pub struct JsonRecordParser;

impl JsonRecordParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonRecordParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser for JsonRecordParser {
    fn parse(&mut self, line: &str, stream: OutputStream) -> OutputRecord {
        if stream == OutputStream::Stderr {
            return OutputRecord::NativeStderr {
                line: line.to_string(),
            };
        }

        let trimmed = line.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') && trimmed.contains("\"kind\"") {
            if let Ok(record) = serde_json::from_str::<OutputRecord>(trimmed) {
                return record;
            }
        }

        OutputRecord::Value {
            text: line.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TraceLevel;

    #[test]
    fn test_decodes_record_lines() {
        let mut parser = JsonRecordParser::new();
        assert_eq!(
            parser.parse(r#"{"kind":"error","message":"boom"}"#, OutputStream::Stdout),
            OutputRecord::error("boom")
        );
        assert_eq!(
            parser.parse(
                r#"  {"kind":"trace","level":"verbose","message":"step 1"}"#,
                OutputStream::Stdout
            ),
            OutputRecord::trace(TraceLevel::Verbose, "step 1")
        );
    }

    #[test]
    fn test_plain_and_malformed_lines_are_values() {
        let mut parser = JsonRecordParser::new();
        assert_eq!(
            parser.parse("hello", OutputStream::Stdout),
            OutputRecord::value("hello")
        );
        assert_eq!(
            parser.parse(r#"{"kind":"nope"}"#, OutputStream::Stdout),
            OutputRecord::value(r#"{"kind":"nope"}"#)
        );
        assert_eq!(
            parser.parse(r#"{"a":1}"#, OutputStream::Stdout),
            OutputRecord::value(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_stderr_is_native() {
        let mut parser = JsonRecordParser::new();
        assert_eq!(
            parser.parse("ls: cannot access", OutputStream::Stderr),
            OutputRecord::NativeStderr {
                line: "ls: cannot access".to_string()
            }
        );
    }
}
