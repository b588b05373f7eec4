use std::io;
use thiserror::Error;

/// Every failure the shell can surface to the player.
///
/// The first four variants form the player-facing taxonomy: they are rendered
/// verbatim and never leave the session half-mutated. The remaining variants
/// wrap infrastructure failures from the engine, the filesystem and serde.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("{0}")]
    SyntaxRejected(String),
    #[error("{0}")]
    AuthorizationDenied(String),
    #[error("{0}")]
    EngineExecution(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
