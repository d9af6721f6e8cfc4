use std::fmt;
use std::sync::Arc;

use crate::error::{SolverError, check_len};
use crate::linalg::Matrix;

/// Scalar function of the decision vector, evaluated by value only
pub type ScalarFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Twice-differentiable scalar function with closed-form derivatives
pub trait SmoothFunction: Send + Sync {
    fn value(&self, x: &[f64]) -> f64;

    /// Writes the gradient into `grad` (same length as `x`)
    fn gradient(&self, x: &[f64], grad: &mut [f64]);

    /// Adds `scale * ∇²f(x)` into `hess`
    fn add_hessian(&self, x: &[f64], scale: f64, hess: &mut Matrix);
}

// ---------------------------------------------------------------------------
// Linear programs (trust-region subproblems)
// ---------------------------------------------------------------------------

/// Linear program over non-negative variables
#[derive(Debug, Clone)]
pub struct LpProblem {
    pub variables: Vec<String>,
    pub objective: LpObjective,
    pub constraints: Vec<LpConstraint>,
}

#[derive(Debug, Clone)]
pub struct LpObjective {
    pub coefficients: Vec<f64>,
    pub minimize: bool,
}

#[derive(Debug, Clone)]
pub struct LpConstraint {
    pub name: String,
    pub coefficients: Vec<f64>,
    pub op: ConstraintOp,
    pub rhs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl LpProblem {
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            objective: LpObjective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = LpObjective { coefficients, minimize };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(LpConstraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        crate::linalg::dot(&self.objective.coefficients, values)
    }
}

// ---------------------------------------------------------------------------
// Derivative-free minimization
// ---------------------------------------------------------------------------

/// `lower <= matrix * x <= upper`, row by row
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub name: String,
    pub matrix: Vec<Vec<f64>>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl LinearConstraint {
    pub fn new(name: impl Into<String>, matrix: Vec<Vec<f64>>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            matrix,
            lower,
            upper,
        }
    }

    /// Identity coefficient matrix, i.e. plain variable bounds
    pub fn bounds(name: impl Into<String>, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        let n = lower.len();
        let matrix = (0..n)
            .map(|i| {
                let mut row = vec![0.0; n];
                row[i] = 1.0;
                row
            })
            .collect();
        Self::new(name, matrix, lower, upper)
    }
}

/// `lower <= fun(x) <= upper`; either side may be infinite
#[derive(Clone)]
pub struct NonlinearConstraint {
    pub name: String,
    pub fun: ScalarFn,
    pub lower: f64,
    pub upper: f64,
}

impl NonlinearConstraint {
    pub fn new(name: impl Into<String>, fun: ScalarFn, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            fun,
            lower,
            upper,
        }
    }
}

impl fmt::Debug for NonlinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearConstraint")
            .field("name", &self.name)
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .finish_non_exhaustive()
    }
}

/// Minimize `objective(x)` from `x0` subject to linear and nonlinear constraints
#[derive(Clone)]
pub struct MinimizeProblem {
    pub objective: ScalarFn,
    pub x0: Vec<f64>,
    pub linear: Vec<LinearConstraint>,
    pub nonlinear: Vec<NonlinearConstraint>,
}

impl MinimizeProblem {
    pub fn new(objective: ScalarFn, x0: Vec<f64>) -> Self {
        Self {
            objective,
            x0,
            linear: Vec::new(),
            nonlinear: Vec::new(),
        }
    }

    pub fn add_linear(&mut self, constraint: LinearConstraint) {
        self.linear.push(constraint);
    }

    pub fn add_nonlinear(&mut self, constraint: NonlinearConstraint) {
        self.nonlinear.push(constraint);
    }

    pub fn dim(&self) -> usize {
        self.x0.len()
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        let n = self.dim();
        if n == 0 {
            return Err(SolverError::Empty);
        }
        if self.x0.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite("initial point".to_string()));
        }
        for c in &self.linear {
            check_len(&format!("{} lower", c.name), c.matrix.len(), c.lower.len())?;
            check_len(&format!("{} upper", c.name), c.matrix.len(), c.upper.len())?;
            for row in &c.matrix {
                check_len(&format!("{} row", c.name), n, row.len())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MinimizeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinimizeProblem")
            .field("x0", &self.x0)
            .field("linear", &self.linear)
            .field("nonlinear", &self.nonlinear)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Smooth nonlinear programs (interior point)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub initial: f64,
}

/// `lower <= body(x) <= upper`; either side may be infinite
#[derive(Clone)]
pub struct ScalarConstraint {
    pub name: String,
    pub body: Arc<dyn SmoothFunction>,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Clone)]
pub struct NlpObjective {
    pub body: Arc<dyn SmoothFunction>,
    pub sense: Sense,
}

/// Declarative NLP: bounded variables, one objective, scalar constraints
#[derive(Clone, Default)]
pub struct NlpModel {
    pub variables: Vec<Variable>,
    pub objective: Option<NlpObjective>,
    pub constraints: Vec<ScalarConstraint>,
}

impl NlpModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable and returns its index
    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64, initial: f64) -> usize {
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper,
            initial,
        });
        self.variables.len() - 1
    }

    pub fn set_objective(&mut self, body: Arc<dyn SmoothFunction>, sense: Sense) {
        self.objective = Some(NlpObjective { body, sense });
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, body: Arc<dyn SmoothFunction>, lower: f64, upper: f64) {
        self.constraints.push(ScalarConstraint {
            name: name.into(),
            body,
            lower,
            upper,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn initial_point(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.initial).collect()
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if self.variables.is_empty() {
            return Err(SolverError::Empty);
        }
        for v in &self.variables {
            if !v.initial.is_finite() || v.lower.is_nan() || v.upper.is_nan() {
                return Err(SolverError::NonFinite(format!("variable {}", v.name)));
            }
            if v.lower > v.upper {
                return Err(SolverError::InvertedBounds {
                    name: v.name.clone(),
                    lower: v.lower,
                    upper: v.upper,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NlpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constraints: Vec<_> = self
            .constraints
            .iter()
            .map(|c| (c.name.as_str(), c.lower, c.upper))
            .collect();
        f.debug_struct("NlpModel")
            .field("variables", &self.variables)
            .field("sense", &self.objective.as_ref().map(|o| o.sense))
            .field("constraints", &constraints)
            .finish()
    }
}
