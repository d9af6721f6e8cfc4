use priceopt_solver::SolverError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Problem data has no SKUs")]
    EmptyData,
    #[error("Duplicate SKU key: {0}")]
    DuplicateSku(String),
    #[error("Invalid {field} for SKU {sku}: {reason}")]
    InvalidField {
        sku: String,
        field: &'static str,
        reason: String,
    },
    #[error("Unknown solver backend: {0}")]
    UnknownBackend(String),
    #[error("Objective is already initialized")]
    ObjectiveAlreadySet,
    #[error("Constraints are already initialized")]
    ConstraintsAlreadySet,
    #[error("Cannot solve before the {0} is initialized")]
    NotInitialized(&'static str),
    #[error("A solve is already in progress on this model")]
    SolveInProgress,
    #[error("Solver rejected the model: {0}")]
    Solver(#[from] SolverError),
}
