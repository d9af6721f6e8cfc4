use priceopt_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Error reading {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("Error writing {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bad distribution parameters: {0}")]
    Distribution(String),
    #[error("Either a data file or --n must be given")]
    NoInput,
    #[error("Invalid size range {from}..={to} step {step}")]
    Range { from: usize, to: usize, step: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, CliError>;
