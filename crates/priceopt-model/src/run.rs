use tracing::{info, warn};

use crate::backend::{BackendKind, BackendOptions};
use crate::data::ProblemData;
use crate::error::ModelError;
use crate::result::Solution;
use crate::timing::timed;

/// Builds a model over `data`, initializes it for the named backend and
/// solves it. The returned duration covers the whole sequence; this is the
/// only place a solution's duration is stamped.
///
/// Unknown backend names fail before any model is built.
pub fn pricing_optimization(data: &ProblemData, solver: &str, options: &BackendOptions) -> Result<Solution, ModelError> {
    let kind: BackendKind = solver.parse()?;
    run_backend(data, kind, options)
}

pub fn run_backend(data: &ProblemData, kind: BackendKind, options: &BackendOptions) -> Result<Solution, ModelError> {
    let solution: Solution = timed(|| -> Result<Solution, ModelError> {
        let mut backend = kind.build(data, options);
        backend.init_objective()?;
        backend.init_constraints()?;
        backend.solve()
    })?;

    if solution.is_success() {
        info!(
            backend = %kind,
            skus = data.len(),
            revenue = solution.revenue(),
            duration = solution.duration_seconds(),
            "pricing optimization finished"
        );
    } else {
        warn!(
            backend = %kind,
            status = %solution.status,
            native = %solution.native_status,
            violations = solution.violations.len(),
            "pricing optimization did not succeed: {}",
            solution.message
        );
    }
    Ok(solution)
}
