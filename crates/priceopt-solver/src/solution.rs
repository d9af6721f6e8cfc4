use std::fmt;

/// The result of solving an LP subproblem
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: LpStatus,
    /// Values for each variable (empty unless optimal)
    pub values: Vec<f64>,
    pub objective_value: f64,
    /// Number of simplex pivots over both phases
    pub pivots: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// Pivot budget exhausted
    IterationLimit,
}

impl LpSolution {
    pub(crate) fn failed(status: LpStatus, pivots: usize) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: match status {
                LpStatus::Unbounded => f64::NEG_INFINITY,
                _ => f64::INFINITY,
            },
            pivots,
        }
    }
}

/// Information about a violated constraint at a returned point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (the violated side of the constraint)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl ConstraintViolation {
    /// Checks `lower <= actual <= upper` with an absolute tolerance
    pub fn check(name: &str, actual: f64, lower: f64, upper: f64, tolerance: f64) -> Option<Self> {
        if actual < lower - tolerance {
            let amt = lower - actual;
            Some(Self {
                constraint: name.to_string(),
                required: lower,
                actual,
                violation_amount: amt,
                description: format!("{} is below minimum of {:.4} by {:.4}", name, lower, amt),
            })
        } else if actual > upper + tolerance {
            let amt = actual - upper;
            Some(Self {
                constraint: name.to_string(),
                required: upper,
                actual,
                violation_amount: amt,
                description: format!("{} exceeds maximum of {:.4} by {:.4}", name, upper, amt),
            })
        } else {
            None
        }
    }
}

/// Sort by violation amount (worst first)
pub(crate) fn sort_violations(violations: &mut [ConstraintViolation]) {
    violations.sort_by(|a, b| {
        b.violation_amount
            .partial_cmp(&a.violation_amount)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ---------------------------------------------------------------------------
// Derivative-free minimizer
// ---------------------------------------------------------------------------

/// Termination codes of the linear-approximation minimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MinimizeStatus {
    /// Trust region shrank to its final radius at a feasible point
    Converged,
    /// Iteration budget exhausted
    MaxIterations,
    /// Objective or constraints produced non-finite values
    RoundingErrors,
    /// Trust region shrank to its final radius but constraints are still violated
    ConstraintViolation,
}

impl MinimizeStatus {
    pub fn code(self) -> i32 {
        match self {
            MinimizeStatus::Converged => 1,
            MinimizeStatus::MaxIterations => 2,
            MinimizeStatus::RoundingErrors => 3,
            MinimizeStatus::ConstraintViolation => 4,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            MinimizeStatus::Converged => "Optimization terminated successfully.",
            MinimizeStatus::MaxIterations => "Maximum number of iterations has been exceeded.",
            MinimizeStatus::RoundingErrors => "Non-finite function values encountered; rounding errors are damaging.",
            MinimizeStatus::ConstraintViolation => {
                "Did not converge to a solution satisfying the constraints."
            }
        }
    }
}

impl fmt::Display for MinimizeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outcome of a derivative-free minimization
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MinimizeResult {
    /// Best point found
    pub x: Vec<f64>,
    /// Objective at `x`
    pub fun: f64,
    /// Largest absolute constraint violation at `x`
    pub max_violation: f64,
    pub status: MinimizeStatus,
    pub message: String,
    /// Objective evaluations
    pub nfev: usize,
    pub iterations: usize,
    /// Final trust-region radius
    pub rho: f64,
    pub violations: Vec<ConstraintViolation>,
}

impl MinimizeResult {
    pub fn success(&self) -> bool {
        self.status == MinimizeStatus::Converged
    }
}

// ---------------------------------------------------------------------------
// Interior point
// ---------------------------------------------------------------------------

/// Termination conditions of the interior-point method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Termination {
    /// Barrier parameter driven below tolerance at a strictly feasible point
    Optimal,
    /// Feasibility phase converged without finding a strictly feasible point
    LocallyInfeasible,
    /// Newton step budget exhausted
    MaxIterations,
    /// Non-finite evaluations or an unfactorizable Newton system
    NumericalFailure,
}

impl Termination {
    /// Coarse solver status reported alongside the termination condition
    pub fn solver_status(self) -> &'static str {
        match self {
            Termination::Optimal => "ok",
            Termination::LocallyInfeasible => "warning",
            Termination::MaxIterations => "warning",
            Termination::NumericalFailure => "error",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Optimal => "optimal",
            Termination::LocallyInfeasible => "infeasible",
            Termination::MaxIterations => "maxIterations",
            Termination::NumericalFailure => "error",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of an interior-point solve, in the model's variable order
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlpSolution {
    pub termination: Termination,
    pub values: Vec<f64>,
    /// Objective in the model's own sense (not negated)
    pub objective_value: f64,
    /// Newton steps over both phases
    pub iterations: usize,
    /// Final barrier parameter
    pub mu: f64,
    pub message: String,
    pub violations: Vec<ConstraintViolation>,
}
