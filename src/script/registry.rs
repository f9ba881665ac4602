use std::fmt;

use super::namespace::{Script, Symbol, TaskFn, Value};

#[derive(Clone)]
pub enum TaskKind {
    Callable(TaskFn),
    LiteralCommand(String),
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Callable(_) => write!(f, "Callable(..)"),
            TaskKind::LiteralCommand(cmd) => f.debug_tuple("LiteralCommand").field(cmd).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    pub help: Option<String>,
    pub kind: TaskKind,
}

/// Public tasks of one script, in declaration order
#[derive(Clone, Debug, Default)]
pub struct Registry {
    tasks: Vec<Task>,
}

/// A symbol is a task when it is public and either a callable declared by
/// the script itself or a plain string.
pub fn is_public_task(script: &Script, symbol: &Symbol) -> bool {
    if symbol.is_private() {
        return false;
    }
    match symbol.value {
        Value::Callable(_) => symbol.origin == script.module(),
        Value::Text(_) => true,
        Value::Data(_) => false,
    }
}

impl Registry {
    pub fn discover(script: &Script) -> Self {
        let tasks = script
            .symbols()
            .iter()
            .filter(|symbol| is_public_task(script, symbol))
            .map(|symbol| Task {
                name: symbol.name.clone(),
                help: symbol.help.clone(),
                kind: match &symbol.value {
                    Value::Callable(callable) => TaskKind::Callable(callable.clone()),
                    Value::Text(command) => TaskKind::LiteralCommand(command.clone()),
                    Value::Data(_) => unreachable!("data symbols are filtered out"),
                },
            })
            .collect();
        Self { tasks }
    }

    pub fn resolve(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
