use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::execution::{
    ExecutionResult, OutputMode, OutputSink, OutputStream, ProcessExecutor, ProcessExitStatus,
    ProcessOutput, ProcessSpawnRequest, ProcessTerminationMode, ProcessWaitFuture, RunningProcess,
};
use crate::models::{BrewOperation, CoreError, CoreErrorKind};

// Bound on draining pipes after exit; descendants may keep the fds open.
const OUTPUT_DRAIN_WINDOW: Duration = Duration::from_millis(250);

pub struct TokioProcessExecutor;

impl ProcessExecutor for TokioProcessExecutor {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        let program = &request.command.program;
        if program.components().count() > 1 && !program.exists() {
            return Err(CoreError {
                operation: Some(request.operation),
                kind: CoreErrorKind::ExecutableNotFound,
                message: format!("executable '{}' does not exist", program.display()),
            });
        }

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&request.command.args);

        for (key, value) in &request.command.env {
            cmd.env(key, value);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|error| {
            let kind = if error.kind() == std::io::ErrorKind::NotFound {
                CoreErrorKind::ExecutableNotFound
            } else {
                CoreErrorKind::ProcessSpawnFailed
            };
            CoreError {
                operation: Some(request.operation),
                kind,
                message: format!("failed to spawn '{}': {error}", program.display()),
            }
        })?;

        let pid = child.id();
        tracing::debug!(
            operation = request.operation.as_str(),
            pid = ?pid,
            args = ?request.command.args,
            "spawned process"
        );

        Ok(Box::new(TokioRunningProcess {
            child: Mutex::new(Some(child)),
            pid,
            started_at: SystemTime::now(),
            output: request.output,
            operation: request.operation,
        }))
    }
}

struct TokioRunningProcess {
    child: Mutex<Option<tokio::process::Child>>,
    pid: Option<u32>,
    started_at: SystemTime,
    output: OutputMode,
    operation: BrewOperation,
}

impl RunningProcess for TokioRunningProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    fn terminate(&self, mode: ProcessTerminationMode) -> ExecutionResult<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let signal = match mode {
            ProcessTerminationMode::Immediate => libc::SIGKILL,
            ProcessTerminationMode::Graceful => libc::SIGTERM,
        };

        let pgid = -(pid as libc::pid_t);
        let result = unsafe { libc::kill(pgid, signal) };

        if result != 0 {
            let os_error = std::io::Error::last_os_error();
            if os_error.raw_os_error() != Some(libc::ESRCH) {
                return Err(process_failure(
                    self.operation,
                    format!("failed to send signal {signal} to process group {pid}: {os_error}"),
                ));
            }
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&self, _mode: ProcessTerminationMode) -> ExecutionResult<()> {
        let mut guard = self
            .child
            .lock()
            .map_err(|_| process_failure(self.operation, "child mutex poisoned".to_string()))?;
        if let Some(child) = guard.as_mut() {
            child.start_kill().map_err(|error| {
                process_failure(self.operation, format!("failed to kill process: {error}"))
            })?;
        }
        Ok(())
    }

    fn wait(&self) -> ProcessWaitFuture {
        let child = self.child.lock().ok().and_then(|mut slot| slot.take());
        let started_at = self.started_at;
        let operation = self.operation;
        let output = self.output.clone();

        Box::pin(async move {
            let mut child = child.ok_or_else(|| CoreError {
                operation: Some(operation),
                kind: CoreErrorKind::Internal,
                message: "child process already consumed".to_string(),
            })?;

            let sink = match &output {
                OutputMode::Buffered => None,
                OutputMode::Streaming(sink) => Some(sink.clone()),
            };
            let stdout_reader = spawn_reader(child.stdout.take(), OutputStream::Stdout, sink.clone());
            let stderr_reader = spawn_reader(child.stderr.take(), OutputStream::Stderr, sink);

            let status = child.wait().await.map_err(|error| {
                process_failure(operation, format!("failed to wait for process: {error}"))
            })?;

            let stdout = drain(stdout_reader).await;
            let stderr = drain(stderr_reader).await;

            let status = match status.code() {
                Some(code) => ProcessExitStatus::ExitCode(code),
                None => ProcessExitStatus::Terminated,
            };

            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
                streamed: matches!(output, OutputMode::Streaming(_)),
                started_at,
                finished_at: SystemTime::now(),
            })
        })
    }
}

fn spawn_reader<R>(
    handle: Option<R>,
    stream: OutputStream,
    sink: Option<OutputSink>,
) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let Some(mut handle) = handle else {
            return buffer;
        };

        match sink {
            None => {
                let _ = handle.read_to_end(&mut buffer).await;
            }
            Some(sink) => {
                let mut reader = BufReader::new(handle);
                let mut line = Vec::new();
                loop {
                    line.clear();
                    match reader.read_until(b'\n', &mut line).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            // Keep draining after the surface closes so the child never blocks on a full pipe.
                            let text = String::from_utf8_lossy(&line);
                            let _ = sink.send(stream, text.trim_end_matches(['\n', '\r']));
                        }
                    }
                }
            }
        }
        buffer
    })
}

async fn drain(reader: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(OUTPUT_DRAIN_WINDOW, reader).await {
        Ok(Ok(buffer)) => buffer,
        _ => Vec::new(),
    }
}

fn process_failure(operation: BrewOperation, message: String) -> CoreError {
    CoreError {
        operation: Some(operation),
        kind: CoreErrorKind::ProcessSpawnFailed,
        message,
    }
}
