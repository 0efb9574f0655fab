//! Crate-wide error type.

use thiserror::Error;

/// Errors raised by pencil, transposition and plan operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration: process grid vs. communicator size, duplicate
    /// or out-of-range decomposed axes, invalid permutations, or a pair of
    /// pencils that no single transposition can connect.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A buffer or array does not match the shape its pencil prescribes.
    #[error("shape mismatch: got {got:?}, expected {expected:?}")]
    Shape {
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A transform was applied to an element type it does not accept.
    #[error("element type not supported: {0}")]
    Type(String),
    /// Out-of-range access through a global-index view.
    #[error("global index {index:?} outside the local range {range:?}")]
    Index {
        index: Vec<usize>,
        range: Vec<(usize, usize)>,
    },
    /// Failure surfaced around the message layer.
    #[error("communication error: {0}")]
    Comm(String),
    /// Scratch buffer growth failed.
    #[error("allocation of {bytes} bytes failed")]
    Oom { bytes: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
