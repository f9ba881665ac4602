pub mod args;
pub mod completion;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod scaffold;

pub use args::{ArgumentSet, FLAG_PREFIX, classify};
pub use dispatch::{Dispatcher, TASK_FAILED, TASK_NOT_FOUND};
pub use error::DispatchError;
pub use options::Cli;
pub use scaffold::scaffold;
