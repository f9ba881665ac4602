use std::fmt;
use std::io;
use std::time::Duration;

/// Failures raised by the shell executor.
///
/// A child that runs and exits non-zero is not an error; callers inspect the
/// handle's status instead.
#[derive(Debug)]
pub enum ExecError {
    Spawn { command: String, source: io::Error },
    Io { command: String, source: io::Error },
    Timeout { command: String, after: Duration },
}

impl ExecError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }

    pub fn command(&self) -> &str {
        match self {
            ExecError::Spawn { command, .. } | ExecError::Io { command, .. } | ExecError::Timeout { command, .. } => {
                command
            }
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Spawn { command, source } => write!(f, "failed to spawn '{command}': {source}"),
            ExecError::Io { command, source } => write!(f, "i/o error while running '{command}': {source}"),
            ExecError::Timeout { command, after } => {
                write!(f, "'{command}' timed out after {:.1}s", after.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Spawn { source, .. } | ExecError::Io { source, .. } => Some(source),
            ExecError::Timeout { .. } => None,
        }
    }
}
