use std::io::Write;

use eyre::Result;

use super::args::classify;
use super::error::{DispatchError, suggest_similar_task_names};
use crate::executor::Shell;
use crate::logger::Logger;
use crate::script::{Context, Registry, Script, Status, Task, TaskKind};

/// Exit code for a task name the script does not define
pub const TASK_NOT_FOUND: i32 = 64;

/// Exit code for a task that returned an error or panicked
pub const TASK_FAILED: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle(Vec<String>),
    Listing,
    Invoking { name: String, tokens: Vec<String> },
    Exited(i32),
}

/// Resolves one task from CLI arguments, runs it and yields the exit code
#[derive(Clone, Debug)]
pub struct Dispatcher {
    shell: Shell,
    logger: Logger,
}

impl Dispatcher {
    pub fn new(shell: Shell, logger: Logger) -> Self {
        Self { shell, logger }
    }

    /// Drive `argv` (task name first, then its tokens) to an exit code.
    ///
    /// Listings and diagnostics go to `out`; only failures to write there are
    /// returned as errors.
    pub async fn dispatch(&self, script: &Script, argv: &[String], out: &mut dyn Write) -> Result<i32> {
        let registry = Registry::discover(script);
        self.logger.debug(format_args!(
            "discovered {} task(s) in {}",
            registry.len(),
            script.module()
        ));

        let mut not_found = false;
        let mut state = State::Idle(argv.to_vec());
        loop {
            state = match state {
                State::Idle(mut argv) => {
                    if argv.is_empty() {
                        State::Listing
                    } else {
                        let name = argv.remove(0);
                        State::Invoking { name, tokens: argv }
                    }
                }
                State::Listing => {
                    for name in registry.names() {
                        writeln!(out, "{name}")?;
                    }
                    State::Exited(if not_found { TASK_NOT_FOUND } else { 0 })
                }
                State::Invoking { name, tokens } => match registry.resolve(&name) {
                    Some(task) => State::Exited(self.invoke(task, tokens, out).await?),
                    None => {
                        self.logger.warn(format_args!("task not found: {name}"));
                        let suggestions = suggest_similar_task_names(&name, &registry.names());
                        writeln!(out, "{}", DispatchError::UnknownTask { name, suggestions })?;
                        not_found = true;
                        State::Listing
                    }
                },
                State::Exited(code) => {
                    out.flush()?;
                    self.logger.info(format_args!("exiting with {code}"));
                    return Ok(code);
                }
            };
        }
    }

    async fn invoke(&self, task: &Task, tokens: Vec<String>, out: &mut dyn Write) -> Result<i32> {
        if let Some(help) = &task.help {
            self.logger.debug(format_args!("{}: {}", task.name, help));
        }
        match &task.kind {
            TaskKind::Callable(callable) => {
                let args = classify(&tokens);
                self.logger.info(format_args!(
                    "invoking {} positional={:?} flags={:?}",
                    task.name, args.positional, args.flags
                ));
                let ctx = Context::new(&task.name, self.shell.clone(), self.logger.clone());
                let running = (**callable)(args, ctx);

                // spawned so a panic stops at this boundary
                let failure = match tokio::spawn(running).await {
                    Ok(Ok(status)) => return Ok(status.code()),
                    Ok(Err(report)) => DispatchError::TaskFailed {
                        name: task.name.clone(),
                        error: format!("{report:#}"),
                    },
                    Err(join_error) => {
                        self.logger.error(format_args!("task {} aborted: {join_error}", task.name));
                        DispatchError::TaskPanicked { name: task.name.clone() }
                    }
                };
                self.fail(failure, out)
            }
            TaskKind::LiteralCommand(command) => {
                if !tokens.is_empty() {
                    self.logger.debug(format_args!(
                        "{} is a literal command, ignoring {:?}",
                        task.name, tokens
                    ));
                }
                self.logger.info(format_args!("invoking {}: {}", task.name, command));
                match self.shell.sh(command).await {
                    Ok(handle) => Ok(Status::from(&handle).code()),
                    Err(e) => self.fail(
                        DispatchError::TaskFailed {
                            name: task.name.clone(),
                            error: e.to_string(),
                        },
                        out,
                    ),
                }
            }
        }
    }

    fn fail(&self, failure: DispatchError, out: &mut dyn Write) -> Result<i32> {
        self.logger.error(format_args!("{failure}"));
        writeln!(out, "{failure}")?;
        Ok(TASK_FAILED)
    }
}
