//! Child process management

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, RunnerError};
use crate::parser::{create_parser, ParserKind};
use crate::record::{OutputRecord, OutputStream};

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Additional environment variables
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run a command line through the platform shell
    pub fn shell(command_line: &str) -> Self {
        let (program, args) = default_shell();
        Self::new(program).args(args).arg(command_line)
    }

    /// Human-readable command line
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the command with stdin closed and its own process group
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

/// Interpreter and leading arguments of the platform shell
pub fn default_shell() -> (&'static str, [&'static str; 1]) {
    if cfg!(target_os = "windows") {
        ("cmd", ["/C"])
    } else {
        ("sh", ["-c"])
    }
}

/// Send SIGKILL to the whole process group led by `pid`
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid only signals; no memory is touched
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "kill(-{}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {}

/// Kill `child` and everything in its process group, then reap it.
///
/// `pid` is the id recorded at spawn; the group outlives a leader that
/// has already been reaped.
pub(crate) async fn kill_tree(child: &mut Child, pid: Option<u32>) -> Result<()> {
    if let Some(pid) = pid.or_else(|| child.id()) {
        kill_process_group(pid);
    }
    match child.start_kill() {
        Ok(()) => {},
        // Already exited
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {},
        Err(e) => warn!("Failed to kill child: {}", e),
    }
    child.wait().await?;
    Ok(())
}

/// A running child whose stdout/stderr are parsed into records
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    stdout_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
    finished: bool,
}

impl ProcessHandle {
    /// Spawn `spec` and start streaming parsed records into `tx`
    pub fn spawn(
        spec: &ProcessSpec,
        parser: ParserKind,
        tx: mpsc::Sender<OutputRecord>,
    ) -> Result<Self> {
        info!("Spawning {}", spec.display());

        let mut child = spec.command().spawn().map_err(|e| {
            RunnerError::spawn_failed_with_source(
                format!("Failed to spawn {}: {}", spec.program, e),
                e,
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::spawn_failed("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::spawn_failed("Failed to capture stderr"))?;

        let stdout_handle =
            tokio::spawn(read_lines(stdout, OutputStream::Stdout, parser, tx.clone()));
        let stderr_handle = tokio::spawn(read_lines(stderr, OutputStream::Stderr, parser, tx));

        Ok(Self {
            pid: child.id(),
            child,
            stdout_handle,
            stderr_handle,
            finished: false,
        })
    }

    /// Get the process ID
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit and its output to drain
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        self.finished = true;

        (&mut self.stdout_handle).await.ok();
        (&mut self.stderr_handle).await.ok();

        Ok(status.code().unwrap_or(-1))
    }

    /// Kill the process tree and reap it
    pub async fn kill(&mut self) -> Result<()> {
        self.stdout_handle.abort();
        self.stderr_handle.abort();
        kill_tree(&mut self.child, self.pid).await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stdout_handle.abort();
        self.stderr_handle.abort();
        if !self.finished {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }
    }
}

async fn read_lines<R>(
    stream: R,
    kind: OutputStream,
    parser: ParserKind,
    tx: mpsc::Sender<OutputRecord>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut parser = create_parser(parser);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {},
            Err(e) => {
                warn!("Failed to read {:?}: {}", kind, e);
                break;
            },
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        debug!("{:?}: {}", kind, line);

        if tx.send(parser.parse(line, kind)).await.is_err() {
            warn!("Record channel closed, stopping {:?} reader", kind);
            break;
        }
    }
}
