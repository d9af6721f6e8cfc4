use std::sync::Arc;

use priceopt_solver::{
    LinearApprox, LinearConstraint, MinimizeProblem, MinimizeStatus, NonlinearConstraint, ScalarFn, SmoothFunction,
};
use tracing::{debug, warn};

use crate::backend::{BackendOptions, SolverBackend};
use crate::error::ModelError;
use crate::model::PricingModel;
use crate::result::{SolveStatus, SolvedModel, Solution};

/// Derivative-free adapter: minimizes negated revenue with bounds as an
/// identity linear constraint and the margin floor as a nonlinear inequality.
pub struct LinearApproxBackend {
    model: PricingModel,
    engine: LinearApprox,
    objective: Option<ScalarFn>,
    bounds: Option<LinearConstraint>,
    margin: Option<NonlinearConstraint>,
}

impl LinearApproxBackend {
    pub fn new(model: PricingModel, options: &BackendOptions) -> Self {
        let mut engine = LinearApprox::new();
        if let Some(max) = options.max_iterations {
            engine = engine.with_max_iterations(max);
        }
        if let Some(tol) = options.tolerance {
            engine = engine.with_tolerance(tol);
        }
        Self {
            model,
            engine,
            objective: None,
            bounds: None,
            margin: None,
        }
    }

    fn problem(&self, x0: Vec<f64>) -> Result<MinimizeProblem, ModelError> {
        let objective = self.objective.clone().ok_or(ModelError::NotInitialized("objective"))?;
        let mut problem = MinimizeProblem::new(objective, x0);
        if let Some(bounds) = &self.bounds {
            problem.add_linear(bounds.clone());
        }
        if let Some(margin) = &self.margin {
            problem.add_nonlinear(margin.clone());
        }
        Ok(problem)
    }

    fn run(&self) -> Result<Solution, ModelError> {
        let problem = self.problem(self.model.x_init().to_vec())?;
        debug!(n = problem.dim(), m_min = self.model.m_min(), "starting linear-approx solve");
        let mut raw = self.engine.minimize(&problem)?;

        let feasible_anchor = self.model.current_prices_feasible();
        if raw.status == MinimizeStatus::ConstraintViolation
            && feasible_anchor
            && self.model.x_init().iter().any(|&x| x != 1.0)
        {
            debug!(max_violation = raw.max_violation, "stalled at an infeasible point, restarting from current prices");
            raw = self.engine.minimize(&self.problem(vec![1.0; self.model.len()])?)?;
        }

        let status = normalize(raw.status, feasible_anchor);
        if status != SolveStatus::Success {
            warn!(code = raw.status.code(), max_violation = raw.max_violation, "linear-approx did not succeed");
        }
        let message = if raw.status == MinimizeStatus::ConstraintViolation && feasible_anchor {
            format!("{}; current prices satisfy every constraint", raw.message)
        } else {
            raw.message.clone()
        };
        let x = raw.x.clone();
        Ok(Solution::assemble(
            &self.model,
            &x,
            status,
            raw.status.to_string(),
            message,
            SolvedModel::LinearApprox(raw),
        ))
    }
}

/// A stall at an infeasible point only means infeasibility when the current
/// prices are out of bounds too
fn normalize(status: MinimizeStatus, current_prices_feasible: bool) -> SolveStatus {
    match status {
        MinimizeStatus::Converged => SolveStatus::Success,
        MinimizeStatus::ConstraintViolation if current_prices_feasible => SolveStatus::Failed,
        MinimizeStatus::ConstraintViolation => SolveStatus::Infeasible,
        MinimizeStatus::MaxIterations | MinimizeStatus::RoundingErrors => SolveStatus::Failed,
    }
}

impl SolverBackend for LinearApproxBackend {
    fn name(&self) -> &'static str {
        "linear-approx"
    }

    fn model(&self) -> &PricingModel {
        &self.model
    }

    fn init_objective(&mut self) -> Result<(), ModelError> {
        self.model.mark_objective()?;
        let revenue = self.model.revenue();
        self.objective = Some(Arc::new(move |x: &[f64]| -revenue.value(x)));
        Ok(())
    }

    fn init_constraints(&mut self) -> Result<(), ModelError> {
        self.model.mark_constraints()?;
        self.bounds = Some(LinearConstraint::bounds(
            "bounds",
            self.model.x_lower().to_vec(),
            self.model.x_upper().to_vec(),
        ));
        let margin = self.model.margin();
        self.margin = Some(NonlinearConstraint::new(
            "margin",
            Arc::new(move |x: &[f64]| margin.value(x)),
            self.model.m_min(),
            f64::INFINITY,
        ));
        Ok(())
    }

    fn solve(&mut self) -> Result<Solution, ModelError> {
        self.model.begin_solve()?;
        let result = self.run();
        self.model.end_solve(result.as_ref().is_ok_and(Solution::is_success));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ProblemData, SkuRecord};
    use crate::model::Stage;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn backend(records: Vec<SkuRecord>) -> LinearApproxBackend {
        let model = PricingModel::new(&ProblemData::new(records).unwrap());
        let mut backend = LinearApproxBackend::new(model, &BackendOptions::default());
        backend.init_objective().unwrap();
        backend.init_constraints().unwrap();
        backend
    }

    #[test]
    fn test_single_sku_margin_active() {
        let mut backend = backend(vec![SkuRecord::new("1", 100.0, 60.0, 10.0, -1.5, 0.9, 1.1)]);
        let solution = backend.solve().unwrap();

        assert_eq!(solution.status, SolveStatus::Success, "{}", solution.message);
        assert_eq!(solution.native_status, "1");
        let x = solution.x_opt()[0];
        assert!((0.9..=1.1).contains(&x), "x = {}", x);
        assert_relative_eq!(x, 1.0, epsilon = 1e-4);
        assert!(solution.margin() >= 400.0 * (1.0 - 1e-6), "margin = {}", solution.margin());
        assert_eq!(backend.model().stage(), Stage::Solved);
        // stamped by run_backend, not by the adapter
        assert_eq!(solution.duration, Duration::ZERO);
    }

    #[test]
    fn test_violation_with_feasible_current_prices_is_a_failure() {
        assert_eq!(normalize(MinimizeStatus::ConstraintViolation, true), SolveStatus::Failed);
        assert_eq!(normalize(MinimizeStatus::ConstraintViolation, false), SolveStatus::Infeasible);
        assert_eq!(normalize(MinimizeStatus::Converged, true), SolveStatus::Success);
        assert_eq!(normalize(MinimizeStatus::MaxIterations, false), SolveStatus::Failed);
    }

    #[test]
    fn test_fixed_infeasible_bounds() {
        let mut backend = backend(vec![
            SkuRecord::new("1", 100.0, 60.0, 10.0, -1.5, 0.5, 0.5),
            SkuRecord::new("2", 20.0, 15.0, 4.0, -2.0, 0.5, 0.5),
        ]);
        let solution = backend.solve().unwrap();

        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert_eq!(solution.native_status, "4");
        assert!(!solution.message.contains("current prices"), "{}", solution.message);
        assert!(solution.violations.iter().any(|v| v.constraint == "margin"));
        assert_eq!(backend.model().stage(), Stage::Failed);
    }

    #[test]
    fn test_iteration_cap_is_forwarded() {
        let model = PricingModel::new(
            &ProblemData::new(vec![
                SkuRecord::new("1", 10.0, 6.0, 30.0, -0.5, 0.85, 1.15),
                SkuRecord::new("2", 25.0, 19.0, 12.0, -1.0, 0.85, 1.15),
            ])
            .unwrap(),
        );
        let mut backend = LinearApproxBackend::new(model, &BackendOptions::new().with_max_iterations(1));
        backend.init_constraints().unwrap();
        backend.init_objective().unwrap();

        let solution = backend.solve().unwrap();
        assert_eq!(solution.status, SolveStatus::Failed);
        assert_eq!(solution.native_status, "2");
    }
}
