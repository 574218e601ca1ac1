//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::JanitorError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &JanitorError) -> String {
    match e {
        JanitorError::AlreadyRunning(kind) => {
            format!("Error: a {} is already running in this process", kind)
        }
        other => format!("Error: {}", other),
    }
}
