use crate::data::ProblemData;
use crate::demand::{DemandWeightedSum, demand_response};
use crate::error::ModelError;
use priceopt_solver::SmoothFunction;

/// Lifecycle of one optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Constructed,
    ObjectiveSet,
    ConstraintsSet,
    /// Objective and constraints both initialized
    Ready,
    Solving,
    Solved,
    Failed,
}

/// Backend-neutral pricing problem: data copy plus derived quantities
#[derive(Debug, Clone)]
pub struct PricingModel {
    data: ProblemData,
    price: Vec<f64>,
    cost: Vec<f64>,
    demand: Vec<f64>,
    elasticity: Vec<f64>,
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    x_init: Vec<f64>,
    m_min: f64,
    stage: Stage,
}

impl PricingModel {
    pub fn new(data: &ProblemData) -> Self {
        let records = data.records();
        let column = |f: fn(&crate::data::SkuRecord) -> f64| records.iter().map(f).collect::<Vec<_>>();

        Self {
            price: column(|r| r.price),
            cost: column(|r| r.cost),
            demand: column(|r| r.demand),
            elasticity: column(|r| r.elasticity),
            x_lower: column(|r| r.x_lower),
            x_upper: column(|r| r.x_upper),
            x_init: column(|r| r.initial_multiplier()),
            m_min: data.baseline_margin(),
            data: data.clone(),
            stage: Stage::Constructed,
        }
    }

    pub fn data(&self) -> &ProblemData {
        &self.data
    }

    /// Number of SKUs (decision variables)
    pub fn len(&self) -> usize {
        self.price.len()
    }

    pub fn is_empty(&self) -> bool {
        self.price.is_empty()
    }

    pub fn prices(&self) -> &[f64] {
        &self.price
    }

    pub fn costs(&self) -> &[f64] {
        &self.cost
    }

    pub fn x_lower(&self) -> &[f64] {
        &self.x_lower
    }

    pub fn x_upper(&self) -> &[f64] {
        &self.x_upper
    }

    pub fn x_init(&self) -> &[f64] {
        &self.x_init
    }

    /// Margin floor: aggregate margin at current prices
    pub fn m_min(&self) -> f64 {
        self.m_min
    }

    /// Whether `x = 1` lies inside every bound. The margin floor holds there
    /// by construction, so the problem then has at least one feasible point.
    pub fn current_prices_feasible(&self) -> bool {
        self.x_lower.iter().zip(&self.x_upper).all(|(&lo, &hi)| lo <= 1.0 && 1.0 <= hi)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn sku_name(&self, i: usize) -> String {
        format!("x[{}]", self.data.records()[i].sku)
    }

    /// `Σ P_i * x_i * D_i(x_i)`
    pub fn revenue(&self) -> DemandWeightedSum {
        DemandWeightedSum::new(
            self.price.clone(),
            vec![0.0; self.len()],
            self.demand.clone(),
            self.elasticity.clone(),
        )
    }

    /// `Σ (P_i * x_i - C_i) * D_i(x_i)`
    pub fn margin(&self) -> DemandWeightedSum {
        DemandWeightedSum::new(
            self.price.clone(),
            self.cost.iter().map(|c| -c).collect(),
            self.demand.clone(),
            self.elasticity.clone(),
        )
    }

    pub fn revenue_at(&self, x: &[f64]) -> f64 {
        self.revenue().value(x)
    }

    pub fn margin_at(&self, x: &[f64]) -> f64 {
        self.margin().value(x)
    }

    pub fn demand_at(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .enumerate()
            .map(|(i, &xi)| demand_response(self.demand[i], self.elasticity[i], xi))
            .collect()
    }

    pub(crate) fn mark_objective(&mut self) -> Result<(), ModelError> {
        self.stage = match self.stage {
            Stage::Constructed => Stage::ObjectiveSet,
            Stage::ConstraintsSet => Stage::Ready,
            _ => return Err(ModelError::ObjectiveAlreadySet),
        };
        Ok(())
    }

    pub(crate) fn mark_constraints(&mut self) -> Result<(), ModelError> {
        self.stage = match self.stage {
            Stage::Constructed => Stage::ConstraintsSet,
            Stage::ObjectiveSet => Stage::Ready,
            _ => return Err(ModelError::ConstraintsAlreadySet),
        };
        Ok(())
    }

    /// Solving is allowed once both initializations ran; a finished run may be solved again
    pub(crate) fn begin_solve(&mut self) -> Result<(), ModelError> {
        match self.stage {
            Stage::Ready | Stage::Solved | Stage::Failed => {
                self.stage = Stage::Solving;
                Ok(())
            }
            Stage::Constructed | Stage::ObjectiveSet => Err(ModelError::NotInitialized("constraints")),
            Stage::ConstraintsSet => Err(ModelError::NotInitialized("objective")),
            Stage::Solving => Err(ModelError::SolveInProgress),
        }
    }

    pub(crate) fn end_solve(&mut self, success: bool) {
        self.stage = if success { Stage::Solved } else { Stage::Failed };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SkuRecord;

    fn data() -> ProblemData {
        ProblemData::new(vec![
            SkuRecord::new("a", 100.0, 60.0, 10.0, -1.5, 0.9, 1.1),
            SkuRecord::new("b", 20.0, 15.0, 4.0, -2.0, 0.8, 1.2),
        ])
        .unwrap()
    }

    #[test]
    fn test_derived_quantities() {
        let model = PricingModel::new(&data());

        assert_eq!(model.len(), 2);
        assert_eq!(model.m_min(), 420.0);
        assert_eq!(model.x_init(), &[1.0, 1.0]);
        assert_eq!(model.stage(), Stage::Constructed);
    }

    #[test]
    fn test_no_price_change_anchor() {
        let model = PricingModel::new(&data());
        let ones = vec![1.0; model.len()];

        assert_eq!(model.demand_at(&ones), vec![10.0, 4.0]);
        assert_eq!(model.margin_at(&ones), model.m_min());
        assert_eq!(model.revenue_at(&ones), 100.0 * 10.0 + 20.0 * 4.0);
    }

    #[test]
    fn test_initialization_order_is_free() {
        let mut a = PricingModel::new(&data());
        a.mark_objective().unwrap();
        a.mark_constraints().unwrap();

        let mut b = PricingModel::new(&data());
        b.mark_constraints().unwrap();
        b.mark_objective().unwrap();

        assert_eq!(a.stage(), Stage::Ready);
        assert_eq!(b.stage(), Stage::Ready);
    }

    #[test]
    fn test_sequencing_errors() {
        let mut model = PricingModel::new(&data());
        assert_eq!(model.begin_solve(), Err(ModelError::NotInitialized("constraints")));

        model.mark_objective().unwrap();
        assert_eq!(model.mark_objective(), Err(ModelError::ObjectiveAlreadySet));
        assert_eq!(model.begin_solve(), Err(ModelError::NotInitialized("constraints")));

        model.mark_constraints().unwrap();
        assert_eq!(model.mark_constraints(), Err(ModelError::ConstraintsAlreadySet));
        assert!(model.begin_solve().is_ok());
        assert_eq!(model.stage(), Stage::Solving);

        assert_eq!(model.begin_solve(), Err(ModelError::SolveInProgress));
        assert_eq!(
            ModelError::SolveInProgress.to_string(),
            "A solve is already in progress on this model"
        );

        model.end_solve(false);
        assert_eq!(model.stage(), Stage::Failed);
        assert!(model.begin_solve().is_ok());
    }

    #[test]
    fn test_current_prices_feasible() {
        assert!(PricingModel::new(&data()).current_prices_feasible());

        let shifted = data().with_bounds(1.05, 1.3).unwrap();
        assert!(!PricingModel::new(&shifted).current_prices_feasible());

        let pinned = data().with_bounds(1.0, 1.0).unwrap();
        assert!(PricingModel::new(&pinned).current_prices_feasible());
    }

    #[test]
    fn test_model_owns_a_copy() {
        let source = data();
        let model = PricingModel::new(&source);
        drop(source);
        assert_eq!(model.data().records()[1].sku, "b");
    }
}
