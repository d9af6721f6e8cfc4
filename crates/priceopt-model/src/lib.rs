//! Revenue-maximizing retail price optimization.
//!
//! A [`PricingModel`] chooses one price multiplier per SKU, maximizing
//! `Σ P·x·Q·exp(E·(x − 1))` within per-SKU bounds while keeping aggregate
//! margin at or above its value at current prices. The model is solved
//! through interchangeable [`SolverBackend`]s whose native outcomes are
//! normalized into a [`Solution`].

mod backend;
mod data;
mod demand;
mod error;
mod interior_point;
mod linear_approx;
mod model;
mod result;
mod run;
mod timing;

pub use backend::{BackendKind, BackendOptions, SolverBackend};
pub use data::{ProblemData, SkuRecord};
pub use demand::{DemandWeightedSum, demand_response};
pub use error::ModelError;
pub use interior_point::InteriorPointBackend;
pub use linear_approx::LinearApproxBackend;
pub use model::{PricingModel, Stage};
pub use result::{PricedSku, SolutionReport, SolveStatus, SolvedModel, Solution};
pub use run::{pricing_optimization, run_backend};
pub use timing::{Timed, timed};

pub use priceopt_solver::ConstraintViolation;
