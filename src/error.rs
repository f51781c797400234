use std::path::PathBuf;

use thiserror::Error;

/// Root error type for the build engine.
///
/// Every variant here is something a build can legitimately fail with, as
/// opposed to a bug in the engine itself (which panics instead).
#[derive(Debug, Error)]
pub enum BakeryError {
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Dependency cycle detected among: {0:?}")]
    Cycle(Vec<String>),

    #[error("Multiple default targets defined: {0:?}")]
    TargetConflict(Vec<String>),

    #[error(
        "Recipe \"{recipe}\" failed to create the prescribed output: {missing:?} (checked: {checked:?})"
    )]
    RecipeOutputMissing {
        recipe: String,
        missing: Vec<PathBuf>,
        checked: Vec<PathBuf>,
    },

    #[error("Failed to execute command: {}", argv.join(" "))]
    Subprocess {
        argv: Vec<String>,
        stdout: Vec<String>,
        stderr: Vec<String>,
        exit_code: i32,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BakeryError>;
