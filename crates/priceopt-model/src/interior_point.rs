use std::sync::Arc;

use priceopt_solver::{InteriorPoint, NlpModel, Sense, Termination};
use tracing::{debug, warn};

use crate::backend::{BackendOptions, SolverBackend};
use crate::error::ModelError;
use crate::model::PricingModel;
use crate::result::{SolveStatus, SolvedModel, Solution};

/// Interior-point adapter: one bounded variable per SKU, revenue maximized,
/// margin floor as a single scalar inequality.
pub struct InteriorPointBackend {
    model: PricingModel,
    engine: InteriorPoint,
    nlp: NlpModel,
}

impl InteriorPointBackend {
    pub fn new(model: PricingModel, options: &BackendOptions) -> Self {
        let mut engine = InteriorPoint::new();
        if let Some(max) = options.max_iterations {
            engine = engine.with_max_iterations(max);
        }
        if let Some(tol) = options.tolerance {
            engine = engine.with_tolerance(tol);
        }
        Self {
            model,
            engine,
            nlp: NlpModel::new(),
        }
    }

    /// Variables carry the bounds, so whichever init runs first declares them
    fn declare_variables(&mut self) {
        if self.nlp.num_variables() > 0 {
            return;
        }
        for i in 0..self.model.len() {
            self.nlp.add_variable(
                self.model.sku_name(i),
                self.model.x_lower()[i],
                self.model.x_upper()[i],
                self.model.x_init()[i],
            );
        }
    }

    fn run(&self) -> Result<Solution, ModelError> {
        debug!(
            variables = self.nlp.num_variables(),
            constraints = self.nlp.num_constraints(),
            "starting interior-point solve"
        );
        let mut nlp = self.nlp.clone();
        let mut raw = self.engine.solve(&nlp)?;

        let feasible_anchor = self.model.current_prices_feasible();
        if raw.termination == Termination::LocallyInfeasible
            && feasible_anchor
            && nlp.variables.iter().any(|v| v.initial != 1.0)
        {
            debug!(iterations = raw.iterations, "stalled at an infeasible point, restarting from current prices");
            nlp.variables.iter_mut().for_each(|v| v.initial = 1.0);
            raw = self.engine.solve(&nlp)?;
        }

        let status = normalize(raw.termination, feasible_anchor);
        if status != SolveStatus::Success {
            warn!(termination = %raw.termination, iterations = raw.iterations, "interior-point did not succeed");
        }
        let mut message = format!("{}: {}", raw.termination, raw.message);
        if raw.termination == Termination::LocallyInfeasible && feasible_anchor {
            message.push_str("; current prices satisfy every constraint");
        }
        Ok(Solution::assemble(
            &self.model,
            &raw.values,
            status,
            raw.termination.solver_status(),
            message,
            SolvedModel::InteriorPoint { model: nlp, solution: raw.clone() },
        ))
    }
}

/// Local infeasibility only means infeasibility when the current prices are
/// out of bounds too
fn normalize(termination: Termination, current_prices_feasible: bool) -> SolveStatus {
    match termination {
        Termination::Optimal => SolveStatus::Success,
        Termination::LocallyInfeasible if current_prices_feasible => SolveStatus::Failed,
        Termination::LocallyInfeasible => SolveStatus::Infeasible,
        Termination::MaxIterations | Termination::NumericalFailure => SolveStatus::Failed,
    }
}

impl SolverBackend for InteriorPointBackend {
    fn name(&self) -> &'static str {
        "interior-point"
    }

    fn model(&self) -> &PricingModel {
        &self.model
    }

    fn init_objective(&mut self) -> Result<(), ModelError> {
        self.model.mark_objective()?;
        self.declare_variables();
        self.nlp.set_objective(Arc::new(self.model.revenue()), Sense::Maximize);
        Ok(())
    }

    fn init_constraints(&mut self) -> Result<(), ModelError> {
        self.model.mark_constraints()?;
        self.declare_variables();
        self.nlp
            .add_constraint("margin", Arc::new(self.model.margin()), self.model.m_min(), f64::INFINITY);
        Ok(())
    }

    fn solve(&mut self) -> Result<Solution, ModelError> {
        self.model.begin_solve()?;
        let result = self.run();
        self.model.end_solve(result.as_ref().is_ok_and(Solution::is_success));
        result
    }
}
