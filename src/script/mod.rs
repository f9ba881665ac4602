pub mod namespace;
pub mod registry;

pub use namespace::{Context, PRIVATE_PREFIX, Script, ScriptBuilder, Status, Symbol, TaskFn, TaskFuture, Value};
pub use registry::{Registry, Task, TaskKind};
