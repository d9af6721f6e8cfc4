mod barrier;
mod error;
mod interior_point;
mod linalg;
mod linear_approx;
mod problem;
mod simplex;
mod solution;

pub use error::SolverError;
pub use interior_point::InteriorPoint;
pub use linalg::Matrix;
pub use linear_approx::LinearApprox;
pub use problem::{
    ConstraintOp, LinearConstraint, LpConstraint, LpObjective, LpProblem, MinimizeProblem, NlpModel,
    NlpObjective, NonlinearConstraint, ScalarConstraint, ScalarFn, Sense, SmoothFunction, Variable,
};
pub use simplex::Simplex;
pub use solution::{
    ConstraintViolation, LpSolution, LpStatus, MinimizeResult, MinimizeStatus, NlpSolution, Termination,
};
