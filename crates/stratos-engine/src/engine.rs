use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use stratos_domain::{DebugLevel, OperationKind, StackName, Urn};

use crate::cancel::{CancelDispatch, CancelSource};
use crate::error::EngineError;
use crate::state::StackState;

/// Name of the engine CLI resolved from PATH when no override is given.
pub const DEFAULT_ENGINE_BINARY: &str = "vega";

/// Engine/provider log verbosity, set on child processes when a debug flag
/// is active.
const ENGINE_LOG_ENV: &str = "VEGA_LOG_LEVEL";
const PROVIDER_LOG_ENV: &str = "VEGA_PROVIDER_LOG_LEVEL";
/// Keeps the engine's temporary working directories for post-mortem
/// inspection.
const KEEP_TMP_ENV: &str = "VEGA_KEEP_TMP";

/// Cap on the stdout/stderr tails carried inside operation errors.
const STREAM_TAIL_LIMIT: usize = 8 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One lifecycle operation to run against a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub operation: OperationKind,
    pub stack: StackName,
    pub targets: Vec<Urn>,
    pub target_dependents: bool,
    pub debug: Option<DebugLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSummary {
    /// Whether a cancel request was issued while the operation ran. An
    /// operation may still complete successfully after a late cancel.
    pub cancelled: bool,
}

/// Seam to the underlying IaC engine. `ProcessEngine` is the production
/// strategy; tests substitute doubles.
pub trait Engine {
    /// Select the stack in the engine's backend, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when both select and init fail.
    fn ensure_stack(&self, workdir: &Path, stack: &StackName) -> Result<(), EngineError>;

    /// Run one lifecycle operation, streaming output lines to `on_output`
    /// and polling `cancel` so an operator interrupt turns into exactly one
    /// engine cancel request.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine process cannot be driven, exits
    /// non-zero, or the operation was cancelled.
    fn run_operation(
        &self,
        workdir: &Path,
        request: &OperationRequest,
        cancel: &mut dyn CancelSource,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<OperationSummary, EngineError>;

    /// Export the stack's current resource state.
    ///
    /// # Errors
    ///
    /// Returns an error when the export fails or its output cannot be
    /// decoded.
    fn export_state(&self, workdir: &Path, stack: &StackName) -> Result<StackState, EngineError>;

    /// Ask the engine to cancel the stack's in-flight operation.
    ///
    /// # Errors
    ///
    /// Returns an error when the cancel command fails.
    fn cancel_operation(&self, workdir: &Path, stack: &StackName) -> Result<(), EngineError>;
}

/// Drives the engine CLI as a child process.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    binary: PathBuf,
    binary_name: String,
}

impl ProcessEngine {
    /// Resolve the engine binary on PATH (or verify an explicit path).
    ///
    /// # Errors
    ///
    /// Returns an error when the binary cannot be found.
    pub fn resolve(binary: Option<&str>) -> Result<Self, EngineError> {
        let name = binary.unwrap_or(DEFAULT_ENGINE_BINARY);
        let path = which::which(name).map_err(|_| EngineError::BinaryNotFound {
            binary: name.to_string(),
        })?;
        Ok(Self::with_binary(path))
    }

    /// Use an already-resolved engine binary path.
    #[must_use]
    pub fn with_binary(binary: PathBuf) -> Self {
        let binary_name = binary
            .file_name()
            .map_or_else(|| binary.display().to_string(), |name| name.to_string_lossy().to_string());
        Self {
            binary,
            binary_name,
        }
    }

    fn run_to_completion(&self, workdir: &Path, args: &[&str]) -> Result<Output, EngineError> {
        Command::new(&self.binary)
            .current_dir(workdir)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                binary: self.binary_name.clone(),
                source,
            })
    }
}

impl Engine for ProcessEngine {
    fn ensure_stack(&self, workdir: &Path, stack: &StackName) -> Result<(), EngineError> {
        let select = self.run_to_completion(workdir, &["stack", "select", stack.as_str()])?;
        if select.status.success() {
            return Ok(());
        }

        let init = self.run_to_completion(workdir, &["stack", "init", stack.as_str()])?;
        if init.status.success() {
            Ok(())
        } else {
            Err(EngineError::StackCommandFailed {
                action: "stack init",
                stack: stack.clone(),
                status: init.status,
                stderr: truncate_tail(&init.stderr),
            })
        }
    }

    fn run_operation(
        &self,
        workdir: &Path,
        request: &OperationRequest,
        cancel: &mut dyn CancelSource,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<OperationSummary, EngineError> {
        let mut command = Command::new(&self.binary);
        command
            .current_dir(workdir)
            .arg(request.operation.as_str())
            .args(["--stack", request.stack.as_str()])
            .arg("--non-interactive");
        for target in &request.targets {
            command.args(["--target", target.as_str()]);
        }
        if request.target_dependents {
            command.arg("--target-dependents");
        }
        if let Some(level) = request.debug {
            command.env(ENGINE_LOG_ENV, level.as_str());
            command.env(PROVIDER_LOG_ENV, level.as_str());
            command.env(KEEP_TMP_ENV, "1");
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            binary: self.binary_name.clone(),
            source,
        })?;

        let mut stdout = StreamReader::new(child.stdout.take())?;
        let mut stderr = StreamReader::new(child.stderr.take())?;
        let mut dispatch = CancelDispatch::default();

        let status = loop {
            stdout.drain(on_output)?;
            stderr.drain(on_output)?;

            if dispatch.should_issue(cancel.cancel_requested()) {
                // Best effort; the operation outcome reflects the
                // cancellation either way.
                let _ = self.cancel_operation(workdir, &request.stack);
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    stdout.drain(on_output)?;
                    stderr.drain(on_output)?;
                    break status;
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    return Err(EngineError::Io {
                        context: "failed to poll engine process".to_string(),
                        source,
                    });
                }
            }
        };

        let cancelled = dispatch.issued();
        if status.success() {
            Ok(OperationSummary { cancelled })
        } else if cancelled {
            Err(EngineError::Cancelled {
                operation: request.operation,
                stack: request.stack.clone(),
            })
        } else {
            Err(EngineError::OperationFailed {
                operation: request.operation,
                stack: request.stack.clone(),
                status,
                stdout: stdout.into_tail(),
                stderr: stderr.into_tail(),
            })
        }
    }

    fn export_state(&self, workdir: &Path, stack: &StackName) -> Result<StackState, EngineError> {
        let output =
            self.run_to_completion(workdir, &["stack", "export", "--stack", stack.as_str()])?;
        if !output.status.success() {
            return Err(EngineError::StackCommandFailed {
                action: "stack export",
                stack: stack.clone(),
                status: output.status,
                stderr: truncate_tail(&output.stderr),
            });
        }
        serde_json::from_slice(&output.stdout).map_err(|source| EngineError::StateDecode {
            stack: stack.clone(),
            source,
        })
    }

    fn cancel_operation(&self, workdir: &Path, stack: &StackName) -> Result<(), EngineError> {
        let output = self.run_to_completion(workdir, &["cancel", "--stack", stack.as_str()])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::StackCommandFailed {
                action: "cancel",
                stack: stack.clone(),
                status: output.status,
                stderr: truncate_tail(&output.stderr),
            })
        }
    }
}

fn truncate_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STREAM_TAIL_LIMIT);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// Non-blocking line reader over one child stream. The pipe is switched to
/// `O_NONBLOCK` so the operation loop can interleave output draining with
/// cancellation polling; a capped tail of everything read is kept for error
/// reporting.
struct StreamReader<R> {
    source: Option<R>,
    pending: Vec<u8>,
    tail: Vec<u8>,
}

#[cfg(unix)]
fn set_nonblocking(fd: std::os::fd::BorrowedFd<'_>) -> Result<(), EngineError> {
    use nix::fcntl::{FcntlArg, OFlag, fcntl};

    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|errno| EngineError::Io {
        context: "failed to read engine pipe flags".to_string(),
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    let _ = fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|errno| EngineError::Io {
        context: "failed to set engine pipe non-blocking".to_string(),
        source: std::io::Error::from_raw_os_error(errno as i32),
    })?;
    Ok(())
}

impl<R: Read + std::os::fd::AsFd> StreamReader<R> {
    fn new(source: Option<R>) -> Result<Self, EngineError> {
        #[cfg(unix)]
        if let Some(stream) = &source {
            set_nonblocking(stream.as_fd())?;
        }
        Ok(Self {
            source,
            pending: Vec::new(),
            tail: Vec::new(),
        })
    }

    fn drain(&mut self, on_output: &mut dyn FnMut(&str)) -> Result<(), EngineError> {
        if self.source.is_none() {
            return Ok(());
        }

        let mut chunk = [0_u8; 4096];
        loop {
            let read_result = match self.source.as_mut() {
                Some(stream) => stream.read(&mut chunk),
                None => return Ok(()),
            };
            match read_result {
                Ok(0) => {
                    self.source = None;
                    self.flush_pending(on_output);
                    return Ok(());
                }
                Ok(read) => {
                    append_tail(&mut self.tail, &chunk[..read]);
                    self.pending.extend_from_slice(&chunk[..read]);
                    self.emit_complete_lines(on_output);
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(EngineError::Io {
                        context: "failed to read engine output".to_string(),
                        source,
                    });
                }
            }
        }
    }

    fn emit_complete_lines(&mut self, on_output: &mut dyn FnMut(&str)) {
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            on_output(text.trim_end_matches(['\n', '\r']));
        }
    }

    fn flush_pending(&mut self, on_output: &mut dyn FnMut(&str)) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).to_string();
            self.pending.clear();
            on_output(text.trim_end_matches(['\n', '\r']));
        }
    }

    fn into_tail(self) -> String {
        String::from_utf8_lossy(&self.tail).trim().to_string()
    }
}

fn append_tail(tail: &mut Vec<u8>, chunk: &[u8]) {
    tail.extend_from_slice(chunk);
    if tail.len() > STREAM_TAIL_LIMIT {
        let excess = tail.len() - STREAM_TAIL_LIMIT;
        tail.drain(..excess);
    }
}

#[cfg(test)]
mod tests;
