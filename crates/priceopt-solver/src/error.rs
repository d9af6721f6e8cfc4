use thiserror::Error;

/// Malformed native problems, detected before any iteration runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Problem has no variables")]
    Empty,
    #[error("Model has no objective")]
    MissingObjective,
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    #[error("Variable {name} has lower bound {lower} above upper bound {upper}")]
    InvertedBounds { name: String, lower: f64, upper: f64 },
    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

pub(crate) fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), SolverError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual,
        })
    }
}
