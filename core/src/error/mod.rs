#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;

pub use error::{CliError, EngineError, PersistenceError};
pub use executor::{ExecutionError, GraphError, InputParseError};
