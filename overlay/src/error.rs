//! Error types for display operations

use thiserror::Error;

/// Errors reported by the display engine and its host backends
#[derive(Debug, Error)]
pub enum OsdError {
    #[error("no display available")]
    NoDisplay,

    #[error("display server does not support the shape extension")]
    ShapeUnsupported,

    #[error("out of memory")]
    OutOfMemory,

    #[error("requested font not found: {name}")]
    FontNotFound { name: String },

    #[error("invalid colour: {name}")]
    InvalidColour { name: String },

    #[error("line {index} out of range (display has {line_count} lines)")]
    InvalidLine { index: usize, line_count: usize },

    #[error("unknown command: {kind}")]
    UnknownCommand { kind: String },

    #[error("not a bar value: {payload:?}")]
    InvalidValue { payload: String },

    #[error("cannot scroll {lines} lines (display has {line_count} lines)")]
    InvalidScroll { lines: usize, line_count: usize },

    #[error("{lines} rows do not fit in a host surface")]
    SurfaceTooLarge { lines: usize },

    #[error("display server request failed: {0}")]
    Host(String),

    #[error("failed to start background reactor")]
    ReactorSpawn(#[source] std::io::Error),

    #[error("{0} reactor panicked")]
    ReactorPanicked(&'static str),
}

pub type Result<T, E = OsdError> = std::result::Result<T, E>;
