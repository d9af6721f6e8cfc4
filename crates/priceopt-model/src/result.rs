use std::fmt;
use std::time::Duration;

use priceopt_solver::{ConstraintViolation, MinimizeResult, NlpModel, NlpSolution};

use crate::data::SkuRecord;
use crate::demand::demand_response;
use crate::model::PricingModel;
use crate::timing::Timed;

/// Relative tolerance used when listing violations at the returned point
const VIOLATION_TOLERANCE: f64 = 1e-6;

/// Backend-independent outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SolveStatus {
    Success,
    Infeasible,
    Failed,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Success => "success",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Input row with the optimized multiplier, price and demand attached
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PricedSku {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub record: SkuRecord,
    pub x_opt: f64,
    #[cfg_attr(feature = "serde", serde(rename = "P_opt"))]
    pub price_opt: f64,
    #[cfg_attr(feature = "serde", serde(rename = "Q_opt"))]
    pub demand_opt: f64,
}

impl PricedSku {
    pub fn new(record: SkuRecord, x_opt: f64) -> Self {
        Self {
            price_opt: x_opt * record.price,
            demand_opt: demand_response(record.demand, record.elasticity, x_opt),
            record,
            x_opt,
        }
    }

    pub fn revenue(&self) -> f64 {
        self.price_opt * self.demand_opt
    }

    pub fn margin(&self) -> f64 {
        (self.price_opt - self.record.cost) * self.demand_opt
    }
}

/// Native engine output, kept for diagnostics
#[derive(Debug, Clone)]
pub enum SolvedModel {
    LinearApprox(MinimizeResult),
    InteriorPoint { model: NlpModel, solution: NlpSolution },
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// Termination code as the engine reports it
    pub native_status: String,
    pub message: String,
    /// Wall-clock time of the whole run (build, init, solve), stamped by
    /// `run_backend`. Zero when a backend's `solve` is called directly.
    pub duration: Duration,
    /// One row per SKU, in input order
    pub data: Vec<PricedSku>,
    pub margin_floor: f64,
    /// Bound and margin violations at the returned point, worst first
    pub violations: Vec<ConstraintViolation>,
    pub solved_model: SolvedModel,
}

impl Solution {
    /// Maps the raw decision vector `x` back onto the model's SKUs
    pub fn assemble(
        model: &PricingModel,
        x: &[f64],
        status: SolveStatus,
        native_status: impl Into<String>,
        message: impl Into<String>,
        solved_model: SolvedModel,
    ) -> Self {
        let data: Vec<PricedSku> = model
            .data()
            .records()
            .iter()
            .zip(x)
            .map(|(record, &xi)| PricedSku::new(record.clone(), xi))
            .collect();

        let mut violations = Vec::new();
        for (i, sku) in data.iter().enumerate() {
            let (lower, upper) = (model.x_lower()[i], model.x_upper()[i]);
            let tol = VIOLATION_TOLERANCE * upper.abs().max(1.0);
            violations.extend(ConstraintViolation::check(&model.sku_name(i), sku.x_opt, lower, upper, tol));
        }
        let margin: f64 = data.iter().map(PricedSku::margin).sum();
        let floor = model.m_min();
        violations.extend(ConstraintViolation::check(
            "margin",
            margin,
            floor,
            f64::INFINITY,
            VIOLATION_TOLERANCE * floor.abs().max(1.0),
        ));
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));

        Self {
            status,
            native_status: native_status.into(),
            message: message.into(),
            duration: Duration::ZERO,
            data,
            margin_floor: floor,
            violations,
            solved_model,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SolveStatus::Success
    }

    pub fn x_opt(&self) -> Vec<f64> {
        self.data.iter().map(|s| s.x_opt).collect()
    }

    /// `Σ P_opt * Q_opt`
    pub fn revenue(&self) -> f64 {
        self.data.iter().map(PricedSku::revenue).sum()
    }

    /// `Σ (P_opt - C) * Q_opt`
    pub fn margin(&self) -> f64 {
        self.data.iter().map(PricedSku::margin).sum()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    pub fn report(&self) -> SolutionReport {
        SolutionReport {
            status: self.status,
            message: self.message.clone(),
            duration_seconds: self.duration_seconds(),
            data: self.data.clone(),
        }
    }
}

impl Timed for Solution {
    fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }
}

/// Serializable summary handed to callers
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolutionReport {
    pub status: SolveStatus,
    pub message: String,
    pub duration_seconds: f64,
    pub data: Vec<PricedSku>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProblemData;
    use priceopt_solver::MinimizeStatus;

    fn model() -> PricingModel {
        PricingModel::new(
            &ProblemData::new(vec![
                SkuRecord::new("a", 100.0, 60.0, 10.0, -1.5, 0.9, 1.1),
                SkuRecord::new("b", 20.0, 15.0, 4.0, -2.0, 0.8, 1.2),
            ])
            .unwrap(),
        )
    }

    fn raw(x: &[f64]) -> SolvedModel {
        SolvedModel::LinearApprox(MinimizeResult {
            x: x.to_vec(),
            fun: 0.0,
            max_violation: 0.0,
            status: MinimizeStatus::Converged,
            message: String::new(),
            nfev: 0,
            iterations: 0,
            rho: 0.0,
            violations: Vec::new(),
        })
    }

    #[test]
    fn test_unit_multiplier_reproduces_inputs() {
        let model = model();
        let x = [1.0, 1.0];
        let solution = Solution::assemble(&model, &x, SolveStatus::Success, "1", "ok", raw(&x));

        assert_eq!(solution.data[0].demand_opt, 10.0);
        assert_eq!(solution.data[1].price_opt, 20.0);
        assert_eq!(solution.margin(), solution.margin_floor);
        assert_eq!(solution.revenue(), 1080.0);
        assert!(solution.violations.is_empty(), "{:?}", solution.violations);
    }

    #[test]
    fn test_reports_bound_and_margin_violations() {
        let model = model();
        let x = [0.5, 1.0];
        let solution = Solution::assemble(&model, &x, SolveStatus::Failed, "4", "bad", raw(&x));

        let names: Vec<_> = solution.violations.iter().map(|v| v.constraint.as_str()).collect();
        assert_eq!(names.len(), 2);
        // margin shortfall is in currency units and dominates the 0.4 bound gap
        assert_eq!(names[0], "margin");
        assert_eq!(names[1], "x[a]");
        assert!(!solution.is_success());
    }

    #[test]
    fn test_report_keeps_input_order() {
        let model = model();
        let x = [1.05, 0.9];
        let mut solution = Solution::assemble(&model, &x, SolveStatus::Success, "1", "ok", raw(&x));
        solution.set_duration(Duration::from_millis(1500));

        let report = solution.report();
        assert_eq!(report.duration_seconds, 1.5);
        assert_eq!(report.data[0].record.sku, "a");
        assert_eq!(report.data[1].x_opt, 0.9);
        assert_eq!(solution.x_opt(), vec![1.05, 0.9]);
    }
}
