//! Script execution backends

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, RunnerError};
use crate::parser::ParserKind;
use crate::process::{default_shell, ProcessHandle, ProcessSpec};
use crate::record::OutputRecord;

/// How a script run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub exit_code: i32,
    /// Message of an exception raised by the script, if any
    pub fault: Option<String>,
}

impl ScriptOutcome {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            fault: None,
        }
    }
}

/// An interpreter that runs script text and reports typed records.
///
/// Implementations push every record into `records` as it is produced.
/// Dropping the returned future cancels the run; implementations must
/// release whatever they started when that happens.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run `script` to completion.
    ///
    /// `Err` with [`RunnerError::is_fatal`] means the script never started.
    async fn run(&self, script: &str, records: mpsc::Sender<OutputRecord>) -> Result<ScriptOutcome>;
}

/// Runs scripts through a shell interpreter.
///
/// Lines the script prints as JSON records (`{"kind":"warning","message":...}`)
/// become typed diagnostics; other stdout lines are values and stderr is
/// native command output.
#[derive(Debug, Clone)]
pub struct ShellScriptEngine {
    program: String,
    args: Vec<String>,
}

impl ShellScriptEngine {
    /// Use the platform shell (`sh -c` or `cmd /C`)
    pub fn new() -> Self {
        let (program, args) = default_shell();
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Use a custom interpreter, e.g. `bash -c`; the script is appended as the last argument
    pub fn with_interpreter(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| RunnerError::Validation("Interpreter command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    fn spec(&self, script: &str) -> ProcessSpec {
        ProcessSpec::new(&self.program)
            .args(self.args.iter().cloned())
            .arg(script)
    }
}

impl Default for ShellScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptEngine for ShellScriptEngine {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(
        &self,
        script: &str,
        records: mpsc::Sender<OutputRecord>,
    ) -> Result<ScriptOutcome> {
        let mut handle = ProcessHandle::spawn(&self.spec(script), ParserKind::Script, records)?;
        let exit_code = handle.wait().await?;
        Ok(ScriptOutcome {
            exit_code,
            fault: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TraceLevel;

    #[test]
    fn test_with_interpreter() {
        let engine = ShellScriptEngine::with_interpreter("bash -eu -c").unwrap();
        assert_eq!(engine.name(), "bash");
        assert_eq!(engine.spec("true").args, vec!["-eu", "-c", "true"]);
        assert!(ShellScriptEngine::with_interpreter("  ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_engine_emits_typed_records() {
        let (tx, mut rx) = mpsc::channel(16);
        let script = r#"echo '{"kind":"warning","message":"careful"}'
echo '{"kind":"trace","level":"information","message":"note"}'
echo plain
echo native 1>&2"#;

        let outcome = ShellScriptEngine::new().run(script, tx).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::success());

        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        assert!(records.contains(&OutputRecord::warning("careful")));
        assert!(records.contains(&OutputRecord::trace(TraceLevel::Information, "note")));
        assert!(records.contains(&OutputRecord::value("plain")));
        assert!(records.contains(&OutputRecord::NativeStderr {
            line: "native".to_string()
        }));
    }
}
