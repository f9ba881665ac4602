pub mod error;
pub mod runfile;

pub use error::RunfileError;
pub use runfile::{RUNFILES, RunSpec, Runfile, RunfileSpec, SymbolSpec, divine_runfile, find_runfile};
