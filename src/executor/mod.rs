pub mod error;
pub mod process;

pub use error::ExecError;
pub use process::{DEFAULT_SHELL, Mode, ProcessHandle, Shell, ShellCommand, Wait};
