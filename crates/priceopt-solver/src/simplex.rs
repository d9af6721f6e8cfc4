use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::{LpSolution, LpStatus};

/// Two-phase tableau simplex for the small LPs built by the trust-region minimizer
pub struct Simplex {
    /// Maximum pivots per phase before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
    /// Pivots after which entering columns are chosen by Bland's rule
    bland_after: usize,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
            bland_after: 500,
        }
    }
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Solve the LP with the two-phase simplex method.
    ///
    /// Variables are implicitly non-negative.
    pub fn solve(&self, problem: &LpProblem) -> LpSolution {
        let mut tableau = self.build_tableau(problem);
        let mut pivots = 0;

        // Phase 1: find an initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau, &mut pivots) {
                PhaseResult::Optimal => {}
                PhaseResult::IterationLimit => return LpSolution::failed(LpStatus::IterationLimit, pivots),
                PhaseResult::Unbounded | PhaseResult::Infeasible => {
                    return LpSolution::failed(LpStatus::Infeasible, pivots);
                }
            }
        }

        // Phase 2: optimize
        match self.phase2(&mut tableau, &mut pivots) {
            PhaseResult::Optimal => {}
            PhaseResult::Unbounded => return LpSolution::failed(LpStatus::Unbounded, pivots),
            PhaseResult::IterationLimit => return LpSolution::failed(LpStatus::IterationLimit, pivots),
            PhaseResult::Infeasible => return LpSolution::failed(LpStatus::Infeasible, pivots),
        }

        let values = tableau.values(problem.num_variables());
        LpSolution {
            status: LpStatus::Optimal,
            objective_value: problem.objective_value(&values),
            values,
            pivots,
        }
    }

    fn build_tableau(&self, problem: &LpProblem) -> Tableau {
        let n_vars = problem.num_variables();
        let n_constraints = problem.num_constraints();

        let mut n_slack = 0;
        let mut n_artificial = 0;

        // Rows with a negative RHS are flipped, which also flips their direction
        let effective_ops: Vec<ConstraintOp> = problem
            .constraints
            .iter()
            .map(|c| match (c.op, c.rhs < 0.0) {
                (ConstraintOp::Le, true) => ConstraintOp::Ge,
                (ConstraintOp::Ge, true) => ConstraintOp::Le,
                (op, _) => op,
            })
            .collect();

        for op in &effective_ops {
            match op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
        }

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let total_rows = n_constraints + 1; // +1 for objective

        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; total_rows],
            basic_vars: vec![0; n_constraints],
            n_vars,
            n_slack,
            n_artificial,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, c) in problem.constraints.iter().enumerate() {
            let sign = if c.rhs < 0.0 { -1.0 } else { 1.0 };
            for (j, &coef) in c.coefficients.iter().enumerate().take(n_vars) {
                tableau.data[i][j] = sign * coef;
            }
            tableau.data[i][total_cols - 1] = sign * c.rhs;

            match effective_ops[i] {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0; // surplus
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row stores reduced costs of a maximization;
        // minimization is handled by negating the coefficients
        let obj_row = n_constraints;
        for (j, &coef) in problem.objective.coefficients.iter().enumerate().take(n_vars) {
            tableau.data[obj_row][j] = if problem.objective.minimize { -coef } else { coef };
        }

        tableau
    }

    fn phase1(&self, tableau: &mut Tableau, pivots: &mut usize) -> PhaseResult {
        let n_constraints = tableau.data.len() - 1;
        let n_cols = tableau.data[0].len();
        let art_start = tableau.n_vars + tableau.n_slack;

        let orig_obj = tableau.data[n_constraints].clone();

        // Maximize -sum(artificials)
        for j in 0..n_cols {
            tableau.data[n_constraints][j] = 0.0;
        }
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[n_constraints][j] = -1.0;
        }

        // Price out the basic artificials
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] += tableau.data[i][j];
                }
            }
        }

        let mut converged = false;
        for iteration in 0..self.max_iterations {
            let Some(pivot_col) = self.find_pivot_column(tableau, n_cols - 1, iteration) else {
                converged = true;
                break;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return PhaseResult::Unbounded;
            };
            self.pivot(tableau, pivot_row, pivot_col);
            *pivots += 1;
        }
        if !converged {
            return PhaseResult::IterationLimit;
        }

        let rhs_col = n_cols - 1;
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start && tableau.data[i][rhs_col].abs() > self.tolerance {
                return PhaseResult::Infeasible;
            }
        }

        // Restore original objective and price out the basis
        tableau.data[n_constraints] = orig_obj;
        for i in 0..n_constraints {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[n_constraints][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        PhaseResult::Optimal
    }

    fn phase2(&self, tableau: &mut Tableau, pivots: &mut usize) -> PhaseResult {
        // Artificial columns never re-enter the basis
        let exclude_from = tableau.n_vars + tableau.n_slack;

        for iteration in 0..self.max_iterations {
            let Some(pivot_col) = self.find_pivot_column(tableau, exclude_from, iteration) else {
                return PhaseResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return PhaseResult::Unbounded;
            };
            self.pivot(tableau, pivot_row, pivot_col);
            *pivots += 1;
        }
        PhaseResult::IterationLimit
    }

    /// Entering column among `0..limit`: most positive reduced cost (Dantzig),
    /// or the lowest improving index once `bland_after` pivots have passed
    fn find_pivot_column(&self, tableau: &Tableau, limit: usize, iteration: usize) -> Option<usize> {
        let obj_row = tableau.data.len() - 1;
        let row = &tableau.data[obj_row];

        if iteration >= self.bland_after {
            return (0..limit).find(|&j| row[j] > self.tolerance);
        }

        let mut max_val = self.tolerance;
        let mut max_col = None;
        for (j, &value) in row.iter().enumerate().take(limit) {
            if value > max_val {
                max_val = value;
                max_col = Some(j);
            }
        }
        max_col
    }

    /// Minimum ratio test; ties go to the lowest basic index
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let n_constraints = tableau.data.len() - 1;
        let rhs_col = tableau.data[0].len() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..n_constraints {
            let val = tableau.data[i][col];
            if val > self.tolerance {
                let ratio = tableau.data[i][rhs_col].max(0.0) / val;
                let better = match min_row {
                    None => true,
                    Some(r) => {
                        ratio < min_ratio - self.tolerance
                            || (ratio <= min_ratio + self.tolerance
                                && tableau.basic_vars[i] < tableau.basic_vars[r])
                    }
                };
                if better {
                    min_ratio = ratio;
                    min_row = Some(i);
                }
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();
        let n_cols = tableau.data[0].len();

        tableau.basic_vars[row] = col;

        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }

        let pivot_row = tableau.data[row].clone();
        for i in 0..n_rows {
            if i != row {
                let factor = tableau.data[i][col];
                if factor != 0.0 {
                    for j in 0..n_cols {
                        tableau.data[i][j] -= factor * pivot_row[j];
                    }
                }
            }
        }
    }
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
}

impl Tableau {
    fn values(&self, n_vars: usize) -> Vec<f64> {
        let rhs_col = self.data[0].len() - 1;
        let mut values = vec![0.0; n_vars];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            if basic < n_vars {
                values[basic] = self.data[i][rhs_col].max(0.0);
            }
        }
        values
    }
}

enum PhaseResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LpProblem;

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 11.0).abs() < 1e-6, "obj = {} (expected 11)", solution.objective_value);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=9
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![2.0, 3.0], true);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Ge, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 9.0).abs() < 1e-6, "obj = {} (expected 9)", solution.objective_value);
    }

    #[test]
    fn test_negative_rhs_ge_row() {
        // Minimize x subject to -x >= -2 (x <= 2) and x >= 0.5
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("cap", vec![-1.0], ConstraintOp::Ge, -2.0);
        problem.add_constraint("floor", vec![1.0], ConstraintOp::Ge, 0.5);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Optimal);
        assert!((solution.values[0] - 0.5).abs() < 1e-9, "x = {}", solution.values[0]);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("lower", vec![1.0], ConstraintOp::Ge, 5.0);
        problem.add_constraint("upper", vec![1.0], ConstraintOp::Le, 3.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], false);
        problem.add_constraint("floor", vec![1.0], ConstraintOp::Ge, 1.0);

        let solution = Simplex::new().solve(&problem);

        assert_eq!(solution.status, LpStatus::Unbounded);
    }
}
