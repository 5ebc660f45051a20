pub mod tokio_process;

pub use tokio_process::TokioProcessExecutor;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::models::{BrewOperation, CoreError, CoreErrorKind};

pub type ExecutionResult<T> = Result<T, CoreError>;

pub type ProcessWaitFuture = Pin<Box<dyn Future<Output = ExecutionResult<ProcessOutput>> + Send>>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self, operation: BrewOperation) -> ExecutionResult<()> {
        if self.program.as_os_str().is_empty() {
            return Err(invalid_input(
                operation,
                "command program path must not be empty",
            ));
        }

        if self
            .args
            .iter()
            .any(|arg| arg.is_empty() || arg.contains('\0'))
        {
            return Err(invalid_input(
                operation,
                "command args must be non-empty and must not contain NUL bytes",
            ));
        }

        if self
            .env
            .iter()
            .any(|(key, value)| key.is_empty() || key.contains('\0') || value.contains('\0'))
        {
            return Err(invalid_input(
                operation,
                "environment keys and values must be non-empty and must not contain NUL bytes",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Receiving end of a human-visible terminal surface.
#[derive(Clone, Debug)]
pub struct OutputSink {
    sender: mpsc::UnboundedSender<OutputLine>,
}

impl OutputSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutputLine>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Returns false once the surface has been closed.
    pub fn send(&self, stream: OutputStream, text: impl Into<String>) -> bool {
        self.sender
            .send(OutputLine {
                stream,
                text: text.into(),
            })
            .is_ok()
    }

    pub fn send_text(&self, stream: OutputStream, text: &str) {
        for line in text.lines() {
            if !self.send(stream, line) {
                break;
            }
        }
    }
}

impl PartialEq for OutputSink {
    fn eq(&self, other: &Self) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl Eq for OutputSink {}

/// Buffered output is read after exit; streamed output is forwarded line by line and never kept.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputMode {
    #[default]
    Buffered,
    Streaming(OutputSink),
}

impl OutputMode {
    pub fn from_sink(sink: Option<&OutputSink>) -> Self {
        sink.cloned().map_or(Self::Buffered, Self::Streaming)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessSpawnRequest {
    pub operation: BrewOperation,
    pub command: CommandSpec,
    pub output: OutputMode,
    pub requested_at: SystemTime,
}

impl ProcessSpawnRequest {
    pub fn new(operation: BrewOperation, command: CommandSpec) -> Self {
        Self {
            operation,
            command,
            output: OutputMode::Buffered,
            requested_at: SystemTime::now(),
        }
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn validate(&self) -> ExecutionResult<()> {
        self.command.validate(self.operation)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessTerminationMode {
    Graceful,
    Immediate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessExitStatus {
    ExitCode(i32),
    Terminated,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessOutput {
    pub status: ProcessExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub streamed: bool,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == ProcessExitStatus::ExitCode(0)
    }

    /// `None` when the output went to a streaming surface instead of a buffer.
    pub fn stdout_text(&self) -> Option<String> {
        (!self.streamed).then(|| String::from_utf8_lossy(&self.stdout).into_owned())
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

pub trait RunningProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn terminate(&self, mode: ProcessTerminationMode) -> ExecutionResult<()>;

    /// Resolves once with the exit status. A second call fails with `Internal`.
    fn wait(&self) -> ProcessWaitFuture;
}

pub trait ProcessExecutor: Send + Sync {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>>;
}

pub fn spawn_validated(
    executor: &dyn ProcessExecutor,
    request: ProcessSpawnRequest,
) -> ExecutionResult<Box<dyn RunningProcess>> {
    request.validate()?;
    executor.spawn(request)
}

fn invalid_input(operation: BrewOperation, message: &str) -> CoreError {
    CoreError {
        operation: Some(operation),
        kind: CoreErrorKind::InvalidInput,
        message: message.to_string(),
    }
}
