use thiserror::Error;

use super::executor::{GraphError, InputParseError};
use crate::state::TransitionError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("engine failed: {0}")]
    Engine(#[from] EngineError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("input rejected: {0}")]
    Input(#[from] InputParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failure to read or write one of the persisted documents.
///
/// Writes are fatal: the engine halts rather than keep an in-memory state
/// that has diverged from disk.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write {document} to {path}: {message}")]
    Write {
        document: &'static str,
        path: String,
        message: String,
    },
    #[error("failed to read {document} from {path}: {message}")]
    Read {
        document: &'static str,
        path: String,
        message: String,
    },
    #[error("failed to encode {document}: {message}")]
    Encode {
        document: &'static str,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("task '{0}' is not in the failed state")]
    NotFailed(String),
    #[error("engine halted after a persistence failure; restart required")]
    Halted,
    #[error("config error: {0}")]
    Config(String),
    #[error("runner error: {0}")]
    Runner(String),
}
