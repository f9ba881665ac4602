use std::fmt;
use std::future::Future;
use std::process::ExitStatus;
use std::sync::Arc;

use eyre::Result;
use futures_util::future::BoxFuture;

use crate::cli::args::ArgumentSet;
use crate::executor::process::exit_code;
use crate::executor::{ExecError, ProcessHandle, Shell, ShellCommand};
use crate::logger::Logger;

/// Names starting with this prefix are never tasks
pub const PRIVATE_PREFIX: &str = "_";

pub type TaskFuture = BoxFuture<'static, Result<Status>>;

/// A callable task body: receives the classified arguments and a context
pub type TaskFn = Arc<dyn Fn(ArgumentSet, Context) -> TaskFuture + Send + Sync>;

/// Status code returned by a task; 0 is success
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<()> for Status {
    fn from(_: ()) -> Self {
        Status::SUCCESS
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl From<ExitStatus> for Status {
    fn from(status: ExitStatus) -> Self {
        Status(exit_code(status))
    }
}

impl From<&ProcessHandle> for Status {
    /// Unsettled handles have no status yet and count as failed
    fn from(handle: &ProcessHandle) -> Self {
        Status(handle.code().unwrap_or(1))
    }
}

/// What a task body gets besides its arguments
#[derive(Clone, Debug)]
pub struct Context {
    task: String,
    shell: Shell,
    logger: Logger,
}

impl Context {
    pub fn new(task: impl Into<String>, shell: Shell, logger: Logger) -> Self {
        Self {
            task: task.into(),
            shell,
            logger,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn sh(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.shell.sh(command).await
    }

    pub async fn sh_out(&self, command: impl Into<ShellCommand>) -> Result<String, ExecError> {
        self.shell.sh_out(command).await
    }

    pub async fn sh_async(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.shell.sh_async(command).await
    }

    pub async fn sh_out_async(&self, command: impl Into<ShellCommand>) -> Result<ProcessHandle, ExecError> {
        self.shell.sh_out_async(command).await
    }
}

/// The value bound to a name in a script
#[derive(Clone)]
pub enum Value {
    Callable(TaskFn),
    Text(String),
    Data(serde_yaml::Value),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Callable(_) => write!(f, "Callable(..)"),
            Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Value::Data(data) => f.debug_tuple("Data").field(data).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    /// Module that declared the symbol
    pub origin: String,
    pub help: Option<String>,
    pub value: Value,
}

impl Symbol {
    pub fn is_private(&self) -> bool {
        self.name.starts_with(PRIVATE_PREFIX)
    }
}

/// An ordered namespace of symbols, as declared by one module
#[derive(Clone, Debug, Default)]
pub struct Script {
    module: String,
    symbols: Vec<Symbol>,
}

impl Script {
    pub fn builder(module: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder {
            script: Script::empty(module),
            last: None,
        }
    }

    pub fn empty(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            symbols: Vec::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Symbols in declaration order
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Rebinding a name replaces the value but keeps the original position
    fn bind(&mut self, symbol: Symbol) -> usize {
        match self.symbols.iter().position(|s| s.name == symbol.name) {
            Some(index) => {
                self.symbols[index] = symbol;
                index
            }
            None => {
                self.symbols.push(symbol);
                self.symbols.len() - 1
            }
        }
    }
}

/// Registers symbols into a [`Script`]
pub struct ScriptBuilder {
    script: Script,
    last: Option<usize>,
}

impl ScriptBuilder {
    fn bind(mut self, name: impl Into<String>, origin: String, help: Option<String>, value: Value) -> Self {
        let index = self.script.bind(Symbol {
            name: name.into(),
            origin,
            help,
            value,
        });
        self.last = Some(index);
        self
    }

    fn own(&self) -> String {
        self.script.module.clone()
    }

    /// Register an async task body.
    ///
    /// The body may return anything convertible into a [`Status`]: `()` for
    /// plain success, an `i32`, or a process exit status.
    pub fn task<F, Fut, R>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(ArgumentSet, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Status> + Send + 'static,
    {
        let callable: TaskFn = Arc::new(move |args: ArgumentSet, ctx: Context| -> TaskFuture {
            let running = body(args, ctx);
            Box::pin(async move { running.await.map(Into::<Status>::into) })
        });
        self.callable(name, callable)
    }

    pub fn callable(self, name: impl Into<String>, callable: TaskFn) -> Self {
        let origin = self.own();
        self.bind(name, origin, None, Value::Callable(callable))
    }

    /// Register a literal shell command
    pub fn command(self, name: impl Into<String>, command: impl Into<String>) -> Self {
        let origin = self.own();
        self.bind(name, origin, None, Value::Text(command.into()))
    }

    /// Register a plain value; values are never tasks
    pub fn value(self, name: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        let origin = self.own();
        self.bind(name, origin, None, Value::Data(value.into()))
    }

    /// Attach help text to the symbol registered last
    pub fn help(mut self, help: impl Into<String>) -> Self {
        if let Some(index) = self.last {
            self.script.symbols[index].help = Some(help.into());
        }
        self
    }

    /// Bring in the public symbols of another script, keeping their origin
    pub fn import(mut self, other: &Script) -> Self {
        for symbol in other.symbols.iter().filter(|s| !s.is_private()) {
            self.script.bind(symbol.clone());
        }
        self.last = None;
        self
    }

    pub fn build(self) -> Script {
        self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversions() {
        assert_eq!(Status::from(()), Status::SUCCESS);
        assert_eq!(Status::from(7).code(), 7);
        assert!(Status::from(0).is_success());
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let script = Script::builder("Runfile")
            .command("zeta", "true")
            .task("alpha", |_, _| async { Ok(()) })
            .value("middle", 3)
            .build();

        let names: Vec<&str> = script.symbols().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "middle"]);
        assert!(script.symbols().iter().all(|s| s.origin == "Runfile"));
    }

    #[test]
    fn test_rebinding_replaces_in_place() {
        let script = Script::builder("Runfile")
            .command("build", "make")
            .command("test", "make test")
            .command("build", "cargo build")
            .build();

        let names: Vec<&str> = script.symbols().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["build", "test"]);
        match &script.get("build").unwrap().value {
            Value::Text(cmd) => assert_eq!(cmd, "cargo build"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_help_attaches_to_last_symbol() {
        let script = Script::builder("Runfile")
            .command("a", "true")
            .command("b", "false")
            .help("always fails")
            .build();
        assert_eq!(script.get("a").unwrap().help, None);
        assert_eq!(script.get("b").unwrap().help.as_deref(), Some("always fails"));
    }

    #[test]
    fn test_import_keeps_origin_and_skips_private() {
        let helpers = Script::builder("helpers.yml")
            .task("helper", |_, _| async { Ok(()) })
            .task("_hidden", |_, _| async { Ok(()) })
            .build();
        let script = Script::builder("Runfile").import(&helpers).command("own", "true").build();

        assert_eq!(script.get("helper").unwrap().origin, "helpers.yml");
        assert!(script.get("_hidden").is_none());
        assert_eq!(script.get("own").unwrap().origin, "Runfile");
    }
}
