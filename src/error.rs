use thiserror::Error;

/// Errors surfaced across the crate boundary. Mid-search conditions
/// (time up, stop requested) are not errors; they travel through the
/// shared stop flag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The FEN string violated the FEN grammar. The field index is the
    /// zero-based space-separated field that failed.
    #[error("invalid FEN: {reason} (field {field})")]
    InvalidFen { field: usize, reason: &'static str },

    /// A LAN move string did not match any pseudo-legal move in the
    /// position it was applied to.
    #[error("unknown move `{0}` in the current position")]
    UnknownMove(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
