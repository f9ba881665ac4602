use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;

use super::error::ExecError;
use crate::logger::Logger;

/// Interpreter used when the Runfile does not name one
pub const DEFAULT_SHELL: &str = "sh";

/// `$0` seen by scripts that receive positional arguments
const SCRIPT_ARGV0: &str = "run";

/// Whether the child's output reaches the terminal or is buffered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Child inherits stdout and stderr
    Stream,
    /// Stdout and stderr are piped and buffered as text
    Capture,
}

/// How long `execute` blocks before handing the handle back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    Forever,
    Timeout(Duration),
    /// Return at once; the caller waits on the handle later
    Detach,
}

impl Wait {
    pub fn from_secs(secs: Option<u64>) -> Self {
        secs.map(|s| Wait::Timeout(Duration::from_secs(s))).unwrap_or(Wait::Forever)
    }
}

/// A command string for the shell, plus optional `$1..$n` and environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub script: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl From<&str> for ShellCommand {
    fn from(script: &str) -> Self {
        ShellCommand::new(script)
    }
}

impl From<String> for ShellCommand {
    fn from(script: String) -> Self {
        ShellCommand::new(script)
    }
}

impl From<&String> for ShellCommand {
    fn from(script: &String) -> Self {
        ShellCommand::new(script.as_str())
    }
}

/// Translate an exit status into a process exit code.
///
/// Signal deaths map to `128 + signal` the way shells report them.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// A spawned shell process.
///
/// Blocking handles come back from `execute` already settled. Detached handles
/// hold the live child until `wait` or `communicate` settles them; dropping one
/// unsettled leaves the child running and unreaped.
#[derive(Debug)]
pub struct ProcessHandle {
    command: String,
    mode: Mode,
    pid: Option<u32>,
    child: Option<Child>,
    status: Option<ExitStatus>,
    stdout: Option<String>,
    stderr: Option<String>,
    timed_out: Option<Duration>,
    logger: Logger,
}

impl ProcessHandle {
    fn new(command: String, mode: Mode, child: Child, logger: Logger) -> Self {
        Self {
            command,
            mode,
            pid: child.id(),
            child: Some(child),
            status: None,
            stdout: None,
            stderr: None,
            timed_out: None,
            logger,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once settled
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Exit code, once settled (signals map to `128 + signal`)
    pub fn code(&self) -> Option<i32> {
        self.status.map(exit_code)
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_some()
    }

    /// A timed-out handle never settles; its child was killed and reaped
    pub fn timed_out(&self) -> bool {
        self.timed_out.is_some()
    }

    /// Buffered stdout; `None` for streamed or unsettled handles
    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    /// Buffered stderr; `None` for streamed or unsettled handles
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    /// Block until the child exits and its captured pipes are drained.
    ///
    /// `limit` bounds both: a child that exits while something it started
    /// still holds a pipe open times out too. On timeout the shell process is
    /// killed and reaped before the error is returned; processes it started
    /// itself are not signalled. Waiting again on a timed-out handle repeats
    /// the timeout error.
    pub async fn wait(&mut self, limit: Option<Duration>) -> Result<ExitStatus, ExecError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        if let Some(after) = self.timed_out {
            return Err(ExecError::Timeout {
                command: self.command.clone(),
                after,
            });
        }
        let Some(mut child) = self.child.take() else {
            return Err(ExecError::Io {
                command: self.command.clone(),
                source: io::Error::other("process was never settled and its child is gone"),
            });
        };

        let stdout_reader = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr_reader = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));
        let readers: Vec<AbortHandle> = [&stdout_reader, &stderr_reader]
            .into_iter()
            .flatten()
            .map(JoinHandle::abort_handle)
            .collect();

        let settling = async {
            let status = child.wait().await?;
            let stdout = collect_text(stdout_reader).await?;
            let stderr = collect_text(stderr_reader).await?;
            Ok::<_, io::Error>((status, stdout, stderr))
        };
        let settled = match limit {
            Some(limit) => match timeout(limit, settling).await {
                Ok(settled) => settled,
                Err(_) => {
                    self.logger.warn(format_args!(
                        "pid={:?} exceeded {:.1}s, killing: {}",
                        self.pid,
                        limit.as_secs_f64(),
                        self.command
                    ));
                    for reader in &readers {
                        reader.abort();
                    }
                    // the shell may be gone already, leaving only an open pipe
                    if !matches!(child.try_wait(), Ok(Some(_))) {
                        if let Err(e) = child.kill().await {
                            self.logger.error(format_args!("failed to kill pid={:?}: {e}", self.pid));
                        }
                    }
                    self.timed_out = Some(limit);
                    return Err(ExecError::Timeout {
                        command: self.command.clone(),
                        after: limit,
                    });
                }
            },
            None => settling.await,
        };

        let (status, stdout, stderr) = settled.map_err(|source| ExecError::Io {
            command: self.command.clone(),
            source,
        })?;
        self.stdout = stdout;
        self.stderr = stderr;
        self.status = Some(status);

        self.logger.debug(format_args!(
            "pid={:?} exited with {}: {}",
            self.pid,
            exit_code(status),
            self.command
        ));
        Ok(status)
    }

    /// Wait, then return the buffered `(stdout, stderr)`; empty for streamed handles
    pub async fn communicate(&mut self, limit: Option<Duration>) -> Result<(String, String), ExecError> {
        self.wait(limit).await?;
        Ok((
            self.stdout.clone().unwrap_or_default(),
            self.stderr.clone().unwrap_or_default(),
        ))
    }
}

async fn drain<R>(mut pipe: R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    pipe.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

async fn collect_text(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Option<String>> {
    match reader {
        Some(reader) => {
            let bytes = reader.await.map_err(io::Error::other)??;
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        None => Ok(None),
    }
}

/// Runs command strings through a shell interpreter
#[derive(Clone, Debug)]
pub struct Shell {
    program: String,
    default_wait: Wait,
    logger: Logger,
}

impl Shell {
    pub fn new(logger: Logger) -> Self {
        Self {
            program: DEFAULT_SHELL.to_string(),
            default_wait: Wait::Forever,
            logger,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Wait used by the blocking helpers; `Detach` is treated as `Forever`
    pub fn with_default_wait(mut self, wait: Wait) -> Self {
        self.default_wait = match wait {
            Wait::Detach => Wait::Forever,
            other => other,
        };
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn default_wait(&self) -> Wait {
        self.default_wait
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Spawn `<shell> -c <command>`, then block or detach according to `wait`.
    ///
    /// The command string is handed over verbatim; quoting interpolated values
    /// is the caller's job.
    pub async fn execute(
        &self,
        command: impl Into<ShellCommand>,
        mode: Mode,
        wait: Wait,
    ) -> Result<ProcessHandle, ExecError> {
        let started = Instant::now();
        let command = command.into();

        let mut cmd = Command::new(&self.program);
        cmd.arg("-c").arg(&command.script);
        if !command.args.is_empty() {
            cmd.arg(SCRIPT_ARGV0).args(&command.args);
        }
        cmd.envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        match mode {
            Mode::Stream => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            Mode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.script.clone(),
            source,
        })?;
        let mut handle = ProcessHandle::new(command.script, mode, child, self.logger.clone());
        self.logger.debug(format_args!(
            "spawned pid={:?} mode={:?} wait={:?}: {}",
            handle.pid, mode, wait, handle.command
        ));

        match wait {
            Wait::Detach => {}
            Wait::Forever => {
                handle.wait(None).await?;
            }
            Wait::Timeout(limit) => {
                // budget runs from the start of this call
                handle.wait(Some(limit.saturating_sub(started.elapsed()))).await.map_err(|e| match e {
                    ExecError::Timeout { command, .. } => ExecError::Timeout { command, after: limit },
                    other => other,
                })?;
            }
        }
        Ok(handle)
    }

    /// Streamed, blocking with the default wait
    pub async fn sh(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.execute(command, Mode::Stream, self.default_wait).await
    }

    /// Captured, blocking with the default wait; returns stdout only
    pub async fn sh_out(&self, command: impl Into<ShellCommand>) -> Result<String, ExecError> {
        let handle = self.execute(command, Mode::Capture, self.default_wait).await?;
        Ok(handle.stdout.unwrap_or_default())
    }

    /// Streamed, detached
    pub async fn sh_async(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.execute(command, Mode::Stream, Wait::Detach).await
    }

    /// Captured, detached
    pub async fn sh_out_async(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.execute(command, Mode::Capture, Wait::Detach).await
    }
}
