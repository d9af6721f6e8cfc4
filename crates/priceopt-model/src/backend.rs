use std::fmt;
use std::str::FromStr;

use crate::data::ProblemData;
use crate::error::ModelError;
use crate::interior_point::InteriorPointBackend;
use crate::linear_approx::LinearApproxBackend;
use crate::model::PricingModel;
use crate::result::Solution;

/// Capabilities every solver adapter provides.
///
/// `init_objective` and `init_constraints` may run in either order, each
/// exactly once; `solve` requires both.
pub trait SolverBackend: Send {
    /// Canonical backend name
    fn name(&self) -> &'static str;

    fn model(&self) -> &PricingModel;

    fn init_objective(&mut self) -> Result<(), ModelError>;

    /// Registers the multiplier bounds and the margin floor
    fn init_constraints(&mut self) -> Result<(), ModelError>;

    /// Runs the engine to termination. Engine outcomes (including infeasibility)
    /// come back as a [`Solution`]; only usage errors are returned as `Err`.
    fn solve(&mut self) -> Result<Solution, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Derivative-free trust-region linear approximations
    LinearApprox,
    /// Log-barrier Newton method on closed-form derivatives
    InteriorPoint,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::LinearApprox, BackendKind::InteriorPoint];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::LinearApprox => "linear-approx",
            BackendKind::InteriorPoint => "interior-point",
        }
    }

    /// Constructs a fresh model over a copy of `data` and wraps it in this backend
    pub fn build(self, data: &ProblemData, options: &BackendOptions) -> Box<dyn SolverBackend> {
        let model = PricingModel::new(data);
        match self {
            BackendKind::LinearApprox => Box::new(LinearApproxBackend::new(model, options)),
            BackendKind::InteriorPoint => Box::new(InteriorPointBackend::new(model, options)),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear-approx" | "linear_approx" | "cobyla" => Ok(BackendKind::LinearApprox),
            "interior-point" | "interior_point" | "ipopt" => Ok(BackendKind::InteriorPoint),
            _ => Err(ModelError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine limits chosen by the caller; `None` keeps the engine default
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BackendOptions {
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = Some(tol);
        self
    }
}
