pub mod app;
pub mod cfg;
pub mod cli;
pub mod executor;
pub mod logger;
pub mod script;

pub use app::run_main;
pub use cli::{ArgumentSet, Dispatcher, TASK_FAILED, TASK_NOT_FOUND, classify};
pub use executor::{ExecError, Mode, ProcessHandle, Shell, ShellCommand, Wait};
pub use logger::{LogSink, Logger};
pub use script::{Context, Registry, Script, Status, Task, TaskKind};
