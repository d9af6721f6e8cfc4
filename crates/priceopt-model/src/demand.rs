use priceopt_solver::{Matrix, SmoothFunction};

/// Demand after applying price multiplier `x`: `Q * exp(E * (x - 1))`.
///
/// Equals `Q` at `x = 1` and stays non-negative for every finite `x`.
pub fn demand_response(demand: f64, elasticity: f64, x: f64) -> f64 {
    demand * (elasticity * (x - 1.0)).exp()
}

/// `Σ Q_i * (a_i * x_i + b_i) * exp(E_i * (x_i - 1))`
///
/// Revenue is the case `a = P, b = 0`; margin is `a = P, b = -C`. Each term
/// depends on one multiplier only, so the Hessian is diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandWeightedSum {
    slope: Vec<f64>,
    intercept: Vec<f64>,
    demand: Vec<f64>,
    elasticity: Vec<f64>,
}

impl DemandWeightedSum {
    pub fn new(slope: Vec<f64>, intercept: Vec<f64>, demand: Vec<f64>, elasticity: Vec<f64>) -> Self {
        debug_assert!(slope.len() == intercept.len() && slope.len() == demand.len() && slope.len() == elasticity.len());
        Self {
            slope,
            intercept,
            demand,
            elasticity,
        }
    }

    pub fn len(&self) -> usize {
        self.slope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slope.is_empty()
    }

    /// Value of term `i` at multiplier `x`
    pub fn term(&self, i: usize, x: f64) -> f64 {
        (self.slope[i] * x + self.intercept[i]) * demand_response(self.demand[i], self.elasticity[i], x)
    }

    fn first_derivative(&self, i: usize, x: f64) -> f64 {
        let d = demand_response(self.demand[i], self.elasticity[i], x);
        d * (self.slope[i] + self.elasticity[i] * (self.slope[i] * x + self.intercept[i]))
    }

    fn second_derivative(&self, i: usize, x: f64) -> f64 {
        let d = demand_response(self.demand[i], self.elasticity[i], x);
        let e = self.elasticity[i];
        d * (2.0 * self.slope[i] * e + e * e * (self.slope[i] * x + self.intercept[i]))
    }
}

impl SmoothFunction for DemandWeightedSum {
    fn value(&self, x: &[f64]) -> f64 {
        x.iter().enumerate().map(|(i, &xi)| self.term(i, xi)).sum()
    }

    fn gradient(&self, x: &[f64], grad: &mut [f64]) {
        for (i, &xi) in x.iter().enumerate() {
            grad[i] = self.first_derivative(i, xi);
        }
    }

    fn add_hessian(&self, x: &[f64], scale: f64, hess: &mut Matrix) {
        for (i, &xi) in x.iter().enumerate() {
            hess.add(i, i, scale * self.second_derivative(i, xi));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn margin() -> DemandWeightedSum {
        DemandWeightedSum::new(vec![100.0, 20.0], vec![-60.0, -15.0], vec![10.0, 4.0], vec![-1.5, -2.0])
    }

    #[test]
    fn test_demand_anchor() {
        assert_eq!(demand_response(10.0, -1.5, 1.0), 10.0);
        assert_eq!(demand_response(0.0, -3.0, 0.7), 0.0);
        assert!(demand_response(5.0, -4.0, 50.0) >= 0.0);
    }

    #[test]
    fn test_margin_at_current_prices() {
        // 10 * 40 + 4 * 5
        assert_eq!(margin().value(&[1.0, 1.0]), 420.0);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let f = margin();
        let x = [0.93, 1.07];
        let mut grad = [0.0; 2];
        f.gradient(&x, &mut grad);

        let h = 1e-6;
        for i in 0..2 {
            let mut xp = x;
            let mut xm = x;
            xp[i] += h;
            xm[i] -= h;
            let fd = (f.value(&xp) - f.value(&xm)) / (2.0 * h);
            assert_relative_eq!(grad[i], fd, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_hessian_matches_finite_differences() {
        let f = margin();
        let x = [1.04, 0.88];
        let mut hess = Matrix::zeros(2);
        f.add_hessian(&x, 1.0, &mut hess);

        let h = 1e-5;
        for i in 0..2 {
            let mut gp = [0.0; 2];
            let mut gm = [0.0; 2];
            let mut xp = x;
            let mut xm = x;
            xp[i] += h;
            xm[i] -= h;
            f.gradient(&xp, &mut gp);
            f.gradient(&xm, &mut gm);
            assert_relative_eq!(hess.get(i, i), (gp[i] - gm[i]) / (2.0 * h), max_relative = 1e-5);
        }
        assert_eq!(hess.get(0, 1), 0.0);
    }
}
