//! Derivative-free constrained minimization by linear approximations.
//!
//! Each iteration builds linear models of the objective and every constraint
//! from function values sampled at distance `rho` around the current point,
//! then solves an LP over the trust region `|d| <= rho` with an l1 elastic
//! relaxation of the linearized constraints. Steps are accepted on the l1
//! exact-penalty merit `f + nu * sum(max(0, -c))`; rejected steps halve `rho`
//! until it reaches `rho_end`.

use tracing::{debug, trace};

use crate::error::SolverError;
use crate::linalg::{dot, norm_inf};
use crate::problem::{ConstraintOp, LpProblem, MinimizeProblem};
use crate::simplex::Simplex;
use crate::solution::{
    ConstraintViolation, LpStatus, MinimizeResult, MinimizeStatus, sort_violations,
};

/// Trust-region sequential linear programming minimizer
pub struct LinearApprox {
    /// Initial trust-region radius
    rho_begin: f64,
    /// Final trust-region radius
    rho_end: f64,
    /// Maximum iterations (each costs `n + 1` evaluations)
    max_iterations: usize,
    /// Allowed violation, relative to each constraint's bound
    feasibility_tolerance: f64,
    /// Cap on the scaled penalty parameter
    max_penalty: f64,
    simplex: Simplex,
}

impl Default for LinearApprox {
    fn default() -> Self {
        Self {
            rho_begin: 0.25,
            rho_end: 1e-7,
            max_iterations: 5000,
            feasibility_tolerance: 1e-6,
            max_penalty: 1e8,
            simplex: Simplex::new(),
        }
    }
}

/// One `c(x) >= 0` row after presolve
struct Row {
    name: String,
    source: RowSource,
    bound: f64,
    /// +1 for a lower bound, -1 for an upper bound
    sign: f64,
    scale: f64,
}

#[derive(Clone)]
enum RowSource {
    Linear(Vec<f64>),
    Nonlinear(usize),
}

struct Presolved {
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<Row>,
    /// Names of the linear constraints whose rows were folded into the box
    box_names: Vec<String>,
}

/// Objective and constraint values at one point, both scaled
struct Sample {
    f: f64,
    c: Vec<f64>,
}

impl Sample {
    fn is_finite(&self) -> bool {
        self.f.is_finite() && self.c.iter().all(|v| v.is_finite())
    }

    fn infeasibility(&self) -> f64 {
        self.c.iter().map(|&c| (-c).max(0.0)).sum()
    }

    fn merit(&self, nu: f64) -> f64 {
        self.f + nu * self.infeasibility()
    }
}

impl LinearApprox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rho(mut self, rho_begin: f64, rho_end: f64) -> Self {
        self.rho_begin = rho_begin;
        self.rho_end = rho_end;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    pub fn minimize(&self, problem: &MinimizeProblem) -> Result<MinimizeResult, SolverError> {
        problem.validate()?;
        let n = problem.dim();
        let pre = presolve(problem);

        let mut nfev = 0;
        let mut x: Vec<f64> = problem
            .x0
            .iter()
            .zip(pre.lower.iter().zip(&pre.upper))
            .map(|(&v, (&lo, &hi))| if lo > hi { v } else { v.clamp(lo, hi) })
            .collect();

        if pre.lower.iter().zip(&pre.upper).any(|(lo, hi)| lo > hi) {
            return Ok(self.finish(problem, &pre, x, 0, nfev, self.rho_begin, MinimizeStatus::ConstraintViolation));
        }

        let f_scale = 1.0 / (problem.objective)(&x).abs().max(1.0);
        let free: Vec<usize> = (0..n).filter(|&i| pre.upper[i] > pre.lower[i]).collect();

        let mut current = self.sample(problem, &pre, &x, f_scale);
        nfev += 1;
        if !current.is_finite() {
            return Ok(self.finish(problem, &pre, x, 0, nfev, self.rho_begin, MinimizeStatus::RoundingErrors));
        }

        let mut rho = self.rho_begin;
        let mut nu: f64 = 1.0;
        let mut iterations = 0;
        let mut status = None;

        while !free.is_empty() {
            if iterations >= self.max_iterations {
                status = Some(MinimizeStatus::MaxIterations);
                break;
            }
            iterations += 1;

            // Linear models from forward (or backward, at the upper end) differences
            let m = pre.rows.len();
            let mut g = vec![0.0; free.len()];
            let mut a = vec![vec![0.0; free.len()]; m];
            let mut finite = true;
            for (col, &i) in free.iter().enumerate() {
                let h = if x[i] + rho > pre.upper[i] && x[i] - rho >= pre.lower[i] { -rho } else { rho };
                let mut xp = x.clone();
                xp[i] += h;
                let probe = self.sample(problem, &pre, &xp, f_scale);
                nfev += 1;
                if !probe.is_finite() {
                    finite = false;
                    break;
                }
                g[col] = (probe.f - current.f) / h;
                for k in 0..m {
                    a[k][col] = (probe.c[k] - current.c[k]) / h;
                }
            }
            if !finite {
                status = Some(MinimizeStatus::RoundingErrors);
                break;
            }

            // Penalty must dominate the multipliers of near-active constraints
            let g_norm = dot(&g, &g).sqrt();
            for k in 0..m {
                let a_norm = dot(&a[k], &a[k]).sqrt();
                let reach = rho * a[k].iter().map(|v| v.abs()).sum::<f64>();
                if current.c[k] <= reach && a_norm > 1e-12 {
                    nu = nu.max((2.0 * g_norm / a_norm).min(self.max_penalty));
                }
            }

            let Some(d) = self.step(&pre, &free, &x, rho, &g, &a, &current.c, nu) else {
                rho *= 0.5;
                if rho < self.rho_end {
                    break;
                }
                continue;
            };

            let linear_infeasibility: f64 = (0..m)
                .map(|k| (-(current.c[k] + dot(&a[k], &d))).max(0.0))
                .sum();
            let predicted = nu * current.infeasibility() - (dot(&g, &d) + nu * linear_infeasibility);

            if predicted <= 1e-14 * (1.0 + current.f.abs()) {
                // Model is stationary at this radius
                rho *= 0.5;
                trace!(iteration = iterations, rho, "model stationary, shrinking trust region");
                if rho < self.rho_end {
                    break;
                }
                continue;
            }

            let mut trial_x = x.clone();
            for (col, &i) in free.iter().enumerate() {
                trial_x[i] = (x[i] + d[col]).clamp(pre.lower[i], pre.upper[i]);
            }
            let trial = self.sample(problem, &pre, &trial_x, f_scale);
            nfev += 1;

            let actual = current.merit(nu) - trial.merit(nu);
            let ratio = if trial.is_finite() { actual / predicted } else { f64::NEG_INFINITY };

            trace!(
                iteration = iterations,
                rho,
                nu,
                merit = current.merit(nu),
                ratio,
                "trust-region step"
            );

            if ratio >= 0.1 {
                x = trial_x;
                current = trial;
            } else {
                rho *= 0.5;
                debug!(iteration = iterations, rho, "step rejected, shrinking trust region");
                if rho < self.rho_end {
                    break;
                }
            }
        }

        let status = status.unwrap_or_else(|| {
            let worst = worst_scaled_violation(&current.c);
            if worst <= self.feasibility_tolerance {
                MinimizeStatus::Converged
            } else {
                MinimizeStatus::ConstraintViolation
            }
        });

        Ok(self.finish(problem, &pre, x, iterations, nfev, rho, status))
    }

    /// Solves the elastic trust-region LP and returns the step over free variables
    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        pre: &Presolved,
        free: &[usize],
        x: &[f64],
        rho: f64,
        g: &[f64],
        a: &[Vec<f64>],
        c: &[f64],
        nu: f64,
    ) -> Option<Vec<f64>> {
        let nf = free.len();
        let m = a.len();

        // d = p - q with 0 <= p <= d_up, 0 <= q <= d_down; v >= 0 relaxes each row
        let d_up: Vec<f64> = free.iter().map(|&i| rho.min(pre.upper[i] - x[i]).max(0.0)).collect();
        let d_down: Vec<f64> = free.iter().map(|&i| rho.min(x[i] - pre.lower[i]).max(0.0)).collect();

        let n_lp = 2 * nf + m;
        let names = (0..nf)
            .map(|j| format!("p{}", j))
            .chain((0..nf).map(|j| format!("q{}", j)))
            .chain((0..m).map(|k| format!("v{}", k)))
            .collect();
        let mut lp = LpProblem::new(names);

        let mut objective = vec![0.0; n_lp];
        for j in 0..nf {
            objective[j] = g[j];
            objective[nf + j] = -g[j];
        }
        for k in 0..m {
            objective[2 * nf + k] = nu;
        }
        lp.set_objective(objective, true);

        for j in 0..nf {
            let mut row = vec![0.0; n_lp];
            row[j] = 1.0;
            lp.add_constraint(format!("p{}_max", j), row, ConstraintOp::Le, d_up[j]);
            let mut row = vec![0.0; n_lp];
            row[nf + j] = 1.0;
            lp.add_constraint(format!("q{}_max", j), row, ConstraintOp::Le, d_down[j]);
        }
        for k in 0..m {
            let mut row = vec![0.0; n_lp];
            for j in 0..nf {
                row[j] = a[k][j];
                row[nf + j] = -a[k][j];
            }
            row[2 * nf + k] = 1.0;
            lp.add_constraint(pre.rows[k].name.clone(), row, ConstraintOp::Ge, -c[k]);
        }

        let solution = self.simplex.solve(&lp);
        if solution.status != LpStatus::Optimal {
            debug!(status = ?solution.status, "trust-region LP failed");
            return None;
        }
        Some((0..nf).map(|j| solution.values[j] - solution.values[nf + j]).collect())
    }

    fn sample(&self, problem: &MinimizeProblem, pre: &Presolved, x: &[f64], f_scale: f64) -> Sample {
        let f = (problem.objective)(x) * f_scale;
        let c = pre
            .rows
            .iter()
            .map(|row| {
                let raw = match &row.source {
                    RowSource::Linear(coef) => dot(coef, x),
                    RowSource::Nonlinear(idx) => (problem.nonlinear[*idx].fun)(x),
                };
                row.sign * (raw - row.bound) * row.scale
            })
            .collect();
        Sample { f, c }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        problem: &MinimizeProblem,
        pre: &Presolved,
        x: Vec<f64>,
        iterations: usize,
        nfev: usize,
        rho: f64,
        status: MinimizeStatus,
    ) -> MinimizeResult {
        let fun = (problem.objective)(&x);
        let violations = self.violations(problem, pre, &x);
        let max_violation = violations.iter().map(|v| v.violation_amount).fold(0.0, f64::max);

        debug!(
            status = ?status,
            iterations,
            nfev,
            fun,
            max_violation,
            "linear-approximation minimizer finished"
        );

        MinimizeResult {
            message: status.message().to_string(),
            x,
            fun,
            max_violation,
            status,
            nfev: nfev + 1,
            iterations,
            rho,
            violations,
        }
    }

    fn violations(&self, problem: &MinimizeProblem, pre: &Presolved, x: &[f64]) -> Vec<ConstraintViolation> {
        let tol = |bound: f64| self.feasibility_tolerance * bound.abs().max(1.0);
        let mut violations = Vec::new();

        for c in &problem.linear {
            for (r, coef) in c.matrix.iter().enumerate() {
                let actual = dot(coef, x);
                let name = format!("{}[{}]", c.name, r);
                let bound = if actual < c.lower[r] { c.lower[r] } else { c.upper[r] };
                if let Some(v) = ConstraintViolation::check(&name, actual, c.lower[r], c.upper[r], tol(bound)) {
                    violations.push(v);
                }
            }
        }
        for c in &problem.nonlinear {
            let actual = (c.fun)(x);
            let bound = if actual < c.lower { c.lower } else { c.upper };
            if let Some(v) = ConstraintViolation::check(&c.name, actual, c.lower, c.upper, tol(bound)) {
                violations.push(v);
            }
        }
        if violations.is_empty() && pre.lower.iter().zip(&pre.upper).any(|(lo, hi)| lo > hi) {
            violations.push(ConstraintViolation {
                constraint: pre.box_names.join(", "),
                required: f64::NAN,
                actual: f64::NAN,
                violation_amount: f64::INFINITY,
                description: "Variable bounds are inconsistent".to_string(),
            });
        }

        sort_violations(&mut violations);
        violations
    }
}

fn worst_scaled_violation(c: &[f64]) -> f64 {
    norm_inf(&c.iter().map(|&v| (-v).max(0.0)).collect::<Vec<_>>())
}

/// Folds single-variable linear rows into a box and turns everything else
/// into `c(x) >= 0` rows
fn presolve(problem: &MinimizeProblem) -> Presolved {
    let n = problem.dim();
    let mut lower = vec![f64::NEG_INFINITY; n];
    let mut upper = vec![f64::INFINITY; n];
    let mut rows = Vec::new();
    let mut box_names = Vec::new();

    for c in &problem.linear {
        let mut folded = false;
        for (r, coef) in c.matrix.iter().enumerate() {
            let nonzero: Vec<usize> = (0..n).filter(|&j| coef[j] != 0.0).collect();
            if let [j] = nonzero[..] {
                let (lo, hi) = if coef[j] > 0.0 {
                    (c.lower[r] / coef[j], c.upper[r] / coef[j])
                } else {
                    (c.upper[r] / coef[j], c.lower[r] / coef[j])
                };
                lower[j] = lower[j].max(lo);
                upper[j] = upper[j].min(hi);
                folded = true;
                continue;
            }
            let name = format!("{}[{}]", c.name, r);
            push_rows(&mut rows, &name, RowSource::Linear(coef.clone()), c.lower[r], c.upper[r]);
        }
        if folded {
            box_names.push(c.name.clone());
        }
    }

    for (idx, c) in problem.nonlinear.iter().enumerate() {
        push_rows(&mut rows, &c.name, RowSource::Nonlinear(idx), c.lower, c.upper);
    }

    // Nearly-equal bounds are treated as fixed
    for j in 0..n {
        if lower[j] > upper[j] && lower[j] - upper[j] <= 1e-12 * lower[j].abs().max(1.0) {
            upper[j] = lower[j];
        }
    }

    Presolved {
        lower,
        upper,
        rows,
        box_names,
    }
}

fn push_rows(rows: &mut Vec<Row>, name: &str, source: RowSource, lower: f64, upper: f64) {
    let has_lower = lower.is_finite();
    let has_upper = upper.is_finite();
    if has_lower && has_upper {
        rows.push(Row {
            name: format!("{}_lower", name),
            source: source.clone(),
            bound: lower,
            sign: 1.0,
            scale: 1.0 / lower.abs().max(1.0),
        });
        rows.push(Row {
            name: format!("{}_upper", name),
            source,
            bound: upper,
            sign: -1.0,
            scale: 1.0 / upper.abs().max(1.0),
        });
    } else if has_lower {
        rows.push(Row {
            name: name.to_string(),
            source,
            bound: lower,
            sign: 1.0,
            scale: 1.0 / lower.abs().max(1.0),
        });
    } else if has_upper {
        rows.push(Row {
            name: name.to_string(),
            source,
            bound: upper,
            sign: -1.0,
            scale: 1.0 / upper.abs().max(1.0),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::problem::{LinearConstraint, NonlinearConstraint};
    use approx::assert_relative_eq;

    #[test]
    fn test_bound_constrained_quadratic() {
        // Minimize (x - 2)^2 + (y + 1)^2 with 0 <= x, y <= 1
        // Optimal: x=1, y=0
        let f = Arc::new(|x: &[f64]| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2));
        let mut problem = MinimizeProblem::new(f, vec![0.5, 0.5]);
        problem.add_linear(LinearConstraint::bounds("bounds", vec![0.0, 0.0], vec![1.0, 1.0]));

        let result = LinearApprox::new().minimize(&problem).expect("valid problem");

        assert_eq!(result.status, MinimizeStatus::Converged, "{}", result.message);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.x[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_interior_minimum() {
        // Minimize (x - 0.3)^2 inside [0, 1]
        let f = Arc::new(|x: &[f64]| (x[0] - 0.3).powi(2));
        let mut problem = MinimizeProblem::new(f, vec![0.9]);
        problem.add_linear(LinearConstraint::bounds("bounds", vec![0.0], vec![1.0]));

        let result = LinearApprox::new().minimize(&problem).expect("valid problem");

        assert!(result.success(), "{}", result.message);
        assert!((result.x[0] - 0.3).abs() < 1e-4, "x = {}", result.x[0]);
    }

    #[test]
    fn test_nonlinear_constraint_active() {
        // Minimize x + y subject to x * y >= 1 inside [0.1, 4]^2
        // Optimal: x=1, y=1, obj=2
        let f = Arc::new(|x: &[f64]| x[0] + x[1]);
        let hyperbola = Arc::new(|x: &[f64]| x[0] * x[1]);
        let mut problem = MinimizeProblem::new(f, vec![3.0, 2.5]);
        problem.add_linear(LinearConstraint::bounds("bounds", vec![0.1, 0.1], vec![4.0, 4.0]));
        problem.add_nonlinear(NonlinearConstraint::new("hyperbola", hyperbola, 1.0, f64::INFINITY));

        let result = LinearApprox::new().minimize(&problem).expect("valid problem");

        assert!(result.success(), "{}", result.message);
        assert!((result.fun - 2.0).abs() < 1e-3, "fun = {}", result.fun);
        let product = result.x[0] * result.x[1];
        assert!(product >= 1.0 - 1e-6, "constraint violated: {}", product);
    }

    #[test]
    fn test_infeasible_reports_violation() {
        // x fixed at 0.5 but x^2 >= 1 required
        let f = Arc::new(|x: &[f64]| x[0]);
        let square = Arc::new(|x: &[f64]| x[0] * x[0]);
        let mut problem = MinimizeProblem::new(f, vec![0.5]);
        problem.add_linear(LinearConstraint::bounds("bounds", vec![0.5], vec![0.5]));
        problem.add_nonlinear(NonlinearConstraint::new("square", square, 1.0, f64::INFINITY));

        let result = LinearApprox::new().minimize(&problem).expect("valid problem");

        assert_eq!(result.status, MinimizeStatus::ConstraintViolation);
        assert_eq!(result.status.code(), 4);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].constraint, "square");
        assert_relative_eq!(result.violations[0].violation_amount, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_general_linear_row() {
        // Minimize -x - y subject to x + y <= 1 inside [0, 1]^2
        let f = Arc::new(|x: &[f64]| -x[0] - x[1]);
        let mut problem = MinimizeProblem::new(f, vec![0.0, 0.0]);
        problem.add_linear(LinearConstraint::bounds("bounds", vec![0.0, 0.0], vec![1.0, 1.0]));
        problem.add_linear(LinearConstraint::new(
            "budget",
            vec![vec![1.0, 1.0]],
            vec![f64::NEG_INFINITY],
            vec![1.0],
        ));

        let result = LinearApprox::new().minimize(&problem).expect("valid problem");

        assert!(result.success(), "{}", result.message);
        assert!((result.fun + 1.0).abs() < 1e-6, "fun = {}", result.fun);
    }

    #[test]
    fn test_dimension_mismatch() {
        let f = Arc::new(|x: &[f64]| x[0]);
        let mut problem = MinimizeProblem::new(f, vec![0.0, 0.0]);
        problem.add_linear(LinearConstraint::new("bad", vec![vec![1.0]], vec![0.0], vec![1.0]));

        let err = LinearApprox::new().minimize(&problem).unwrap_err();
        assert!(matches!(err, SolverError::DimensionMismatch { .. }));
    }
}
