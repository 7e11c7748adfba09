//! Error types for strata-db-prolly

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Prolly-tree error type
#[derive(Error, Debug)]
pub enum Error {
    /// Errors surfaced by the core layer (store I/O, codec, cancellation)
    #[error(transparent)]
    Core(#[from] strata_db_core::Error),

    /// The mutable-map overlay hit its capacity bound
    ///
    /// The caller must materialize and restart mutation.
    #[error("overlay full: {pending} pending mutations (max {max})")]
    OverlayFull { pending: usize, max: usize },

    /// A three-way merge finished with unresolved conflicts
    #[error("merge finished with {0} unresolved conflicts")]
    Conflicted(usize),
}

impl Error {
    /// Create an invariant error (structural check failed; indicates a bug)
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Core(strata_db_core::Error::invariant(msg))
    }

    /// Create a decode error flagged as corruption
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Core(strata_db_core::Error::corrupt(msg))
    }
}
