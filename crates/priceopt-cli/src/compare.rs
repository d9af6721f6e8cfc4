use priceopt_model::{BackendKind, BackendOptions, Solution, run_backend};
use rayon::prelude::*;

use crate::error::{CliError, Result};
use crate::generate::generate_data;

/// Both backends on one generated catalog
pub struct Comparison {
    pub n: usize,
    pub linear_approx: Solution,
    pub interior_point: Solution,
}

impl Comparison {
    /// True when every multiplier matches after rounding to two decimals
    pub fn agree(&self) -> bool {
        agree_to_two_decimals(&self.linear_approx.x_opt(), &self.interior_point.x_opt())
    }
}

pub fn agree_to_two_decimals(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x * 100.0).round() == (y * 100.0).round())
}

pub fn sizes(from: usize, to: usize, step: usize) -> Result<Vec<usize>> {
    if step == 0 || from == 0 || from > to {
        return Err(CliError::Range { from, to, step });
    }
    Ok((from..=to).step_by(step).collect())
}

/// Runs every size in parallel; results come back in size order
pub fn compare(sizes: &[usize], seed: u64, options: &BackendOptions) -> Result<Vec<Comparison>> {
    sizes
        .par_iter()
        .map(|&n| {
            let data = generate_data(n, seed)?;
            Ok(Comparison {
                n,
                linear_approx: run_backend(&data, BackendKind::LinearApprox, options)?,
                interior_point: run_backend(&data, BackendKind::InteriorPoint, options)?,
            })
        })
        .collect()
}

pub fn print_table(rows: &[Comparison]) {
    println!(
        "{:>5}  {:>10} {:>10} {:>12} {:>12}  {:>10} {:>10} {:>12} {:>12}  {:>5}",
        "N", "la_secs", "la_status", "la_revenue", "la_margin", "ip_secs", "ip_status", "ip_revenue", "ip_margin", "equal"
    );
    for row in rows {
        let (a, b) = (&row.linear_approx, &row.interior_point);
        println!(
            "{:>5}  {:>10.5} {:>10} {:>12.3} {:>12.3}  {:>10.5} {:>10} {:>12.3} {:>12.3}  {:>5}",
            row.n,
            a.duration_seconds(),
            a.status,
            a.revenue(),
            a.margin(),
            b.duration_seconds(),
            b.status,
            b.revenue(),
            b.margin(),
            row.agree()
        );
    }
}
