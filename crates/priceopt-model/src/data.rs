use std::collections::HashSet;

use crate::error::ModelError;

/// One row of the input catalog
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SkuRecord {
    #[cfg_attr(feature = "serde", serde(alias = "plu"))]
    pub sku: String,
    /// Current price
    #[cfg_attr(feature = "serde", serde(rename = "P"))]
    pub price: f64,
    /// Unit cost
    #[cfg_attr(feature = "serde", serde(rename = "C"))]
    pub cost: f64,
    /// Baseline demand at the current price
    #[cfg_attr(feature = "serde", serde(rename = "Q"))]
    pub demand: f64,
    /// Own-price elasticity
    #[cfg_attr(feature = "serde", serde(rename = "E"))]
    pub elasticity: f64,
    pub x_lower: f64,
    pub x_upper: f64,
    /// Initial multiplier; the bound midpoint when absent
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub x_init: Option<f64>,
}

impl SkuRecord {
    pub fn new(sku: impl Into<String>, price: f64, cost: f64, demand: f64, elasticity: f64, x_lower: f64, x_upper: f64) -> Self {
        Self {
            sku: sku.into(),
            price,
            cost,
            demand,
            elasticity,
            x_lower,
            x_upper,
            x_init: None,
        }
    }

    pub fn with_x_init(mut self, x_init: f64) -> Self {
        self.x_init = Some(x_init);
        self
    }

    pub fn initial_multiplier(&self) -> f64 {
        self.x_init.unwrap_or(0.5 * (self.x_lower + self.x_upper))
    }

    /// Margin at current prices, `Q * (P - C)`
    pub fn baseline_margin(&self) -> f64 {
        self.demand * (self.price - self.cost)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let invalid = |field: &'static str, reason: String| ModelError::InvalidField {
            sku: self.sku.clone(),
            field,
            reason,
        };

        let fields = [
            ("P", self.price),
            ("C", self.cost),
            ("Q", self.demand),
            ("E", self.elasticity),
            ("x_lower", self.x_lower),
            ("x_upper", self.x_upper),
            ("x_init", self.initial_multiplier()),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(invalid(field, format!("{} is not finite", value)));
            }
        }

        if self.price <= 0.0 {
            return Err(invalid("P", format!("price must be positive, got {}", self.price)));
        }
        if self.cost <= 0.0 {
            return Err(invalid("C", format!("cost must be positive, got {}", self.cost)));
        }
        if self.demand < 0.0 {
            return Err(invalid("Q", format!("demand must be non-negative, got {}", self.demand)));
        }
        if self.x_lower <= 0.0 {
            return Err(invalid("x_lower", format!("multiplier bound must be positive, got {}", self.x_lower)));
        }
        if self.x_lower > self.x_upper {
            return Err(invalid(
                "x_upper",
                format!("upper bound {} is below lower bound {}", self.x_upper, self.x_lower),
            ));
        }
        let x_init = self.initial_multiplier();
        if x_init < self.x_lower || x_init > self.x_upper {
            return Err(invalid(
                "x_init",
                format!("{} is outside [{}, {}]", x_init, self.x_lower, self.x_upper),
            ));
        }
        Ok(())
    }
}

/// Validated, immutable SKU catalog
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<SkuRecord>", into = "Vec<SkuRecord>"))]
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemData {
    records: Vec<SkuRecord>,
}

impl ProblemData {
    pub fn new(records: Vec<SkuRecord>) -> Result<Self, ModelError> {
        if records.is_empty() {
            return Err(ModelError::EmptyData);
        }
        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.sku.as_str()) {
                return Err(ModelError::DuplicateSku(record.sku.clone()));
            }
            record.validate()?;
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[SkuRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Aggregate margin at current prices
    pub fn baseline_margin(&self) -> f64 {
        self.records.iter().map(SkuRecord::baseline_margin).sum()
    }

    /// Copy with every multiplier bound replaced
    pub fn with_bounds(&self, x_lower: f64, x_upper: f64) -> Result<Self, ModelError> {
        let records = self
            .records
            .iter()
            .map(|r| SkuRecord {
                x_lower,
                x_upper,
                x_init: None,
                ..r.clone()
            })
            .collect();
        Self::new(records)
    }
}

impl TryFrom<Vec<SkuRecord>> for ProblemData {
    type Error = ModelError;

    fn try_from(records: Vec<SkuRecord>) -> Result<Self, Self::Error> {
        Self::new(records)
    }
}

impl From<ProblemData> for Vec<SkuRecord> {
    fn from(data: ProblemData) -> Self {
        data.records
    }
}
