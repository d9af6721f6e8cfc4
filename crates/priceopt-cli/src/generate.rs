//! Seeded synthetic catalogs.
//!
//! Prices are gamma distributed around 100 and rounded to `.99` endings,
//! elasticities are negated gammas, demand is chi-square damped by relative
//! price, and costs come from a normal markup. Bounds allow ±15 % around a
//! simulated competitor price.

use priceopt_model::{ProblemData, SkuRecord};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{ChiSquared, Distribution, Gamma, Normal};

use crate::error::{CliError, Result};

/// Smallest accepted draw for the price/cost and competitor ratios
const MIN_RATIO: f64 = 0.1;

/// Rounds to the nearest price of the form `k.99`
pub fn price_round(price: f64) -> f64 {
    (price + 0.01).round() - 0.01
}

fn gamma(shape: f64, scale: f64) -> Result<Gamma<f64>> {
    Gamma::new(shape, scale).map_err(|e| CliError::Distribution(e.to_string()))
}

fn normal(mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| CliError::Distribution(e.to_string()))
}

/// Draws from `dist` until the value reaches `MIN_RATIO`
fn positive_ratio(dist: &Normal<f64>, rng: &mut StdRng) -> f64 {
    loop {
        let r = dist.sample(rng);
        if r >= MIN_RATIO {
            return r;
        }
    }
}

pub fn generate_data(n: usize, seed: u64) -> Result<ProblemData> {
    let mut rng = StdRng::seed_from_u64(seed);

    let price_dist = gamma(2.0, 3.0)?;
    let prices: Vec<f64> = (0..n)
        .map(|_| price_round((price_dist.sample(&mut rng) + 4.0) * 10.0))
        .collect();
    let mean_price = prices.iter().sum::<f64>() / n.max(1) as f64;

    let elasticity_dist = gamma(1.7, 0.9)?;
    let elasticities: Vec<f64> = (0..n).map(|_| -elasticity_dist.sample(&mut rng)).collect();

    let demand_dist = ChiSquared::new(5.0).map_err(|e| CliError::Distribution(e.to_string()))?;
    let demands: Vec<f64> = prices
        .iter()
        .map(|p| demand_dist.sample(&mut rng) * (-p / mean_price).exp())
        .collect();

    let markup = normal(1.28, 0.2)?;
    let costs: Vec<f64> = prices
        .iter()
        .map(|p| (p / positive_ratio(&markup, &mut rng) * 100.0).round() / 100.0)
        .collect();

    let mut records = Vec::with_capacity(n);
    for i in 0..n {
        let p = prices[i];
        let spread = normal(1.0, 0.2 * (-p / mean_price).exp())?;
        let competitor = price_round(p * positive_ratio(&spread, &mut rng)).max(0.99);
        records.push(SkuRecord::new(
            (i + 1).to_string(),
            p,
            costs[i],
            demands[i],
            elasticities[i],
            0.85 * competitor / p,
            1.15 * competitor / p,
        ));
    }

    Ok(ProblemData::new(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_round() {
        assert!((price_round(123.4) - 122.99).abs() < 1e-9);
        assert!((price_round(123.6) - 123.99).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_catalog() {
        assert_eq!(generate_data(25, 7).unwrap(), generate_data(25, 7).unwrap());
        assert_ne!(generate_data(25, 7).unwrap(), generate_data(25, 8).unwrap());
    }

    #[test]
    fn test_catalog_invariants() {
        let data = generate_data(200, 42).unwrap();
        assert_eq!(data.len(), 200);

        for r in data.records() {
            let cents = (r.price * 100.0).round() as i64;
            assert_eq!(cents % 100, 99, "price {} does not end in .99", r.price);
            assert!(r.price >= 39.99, "price {}", r.price);
            assert!(r.cost > 0.0 && r.demand >= 0.0);
            assert!(r.elasticity < 0.0);
            assert!((r.x_upper / r.x_lower - 1.15 / 0.85).abs() < 1e-9);
            assert!((r.initial_multiplier() - 0.5 * (r.x_lower + r.x_upper)).abs() < 1e-12);
        }
        assert_eq!(data.records()[0].sku, "1");
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        assert!(matches!(
            generate_data(0, 1),
            Err(CliError::Model(priceopt_model::ModelError::EmptyData))
        ));
    }
}
