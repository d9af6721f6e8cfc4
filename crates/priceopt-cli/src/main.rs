use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use priceopt_model::{BackendOptions, ProblemData, Solution, pricing_optimization};

mod compare;
mod error;
mod generate;

use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "priceopt")]
#[command(about = "Revenue-maximizing price optimization under a margin floor", long_about = None)]
struct Cli {
    /// Log solver iterations (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic catalog as JSON
    Generate {
        /// Number of SKUs
        #[arg(short, long, default_value_t = 10)]
        n: usize,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Solve one catalog with one backend
    Solve {
        /// JSON catalog; a synthetic one is generated when absent
        file: Option<PathBuf>,
        /// Number of SKUs to generate
        #[arg(short, long)]
        n: Option<usize>,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Backend name (linear-approx, interior-point)
        #[arg(long, default_value = "interior-point")]
        solver: String,
        #[arg(long)]
        max_iterations: Option<usize>,
        #[arg(long)]
        tolerance: Option<f64>,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Run both backends over a range of generated sizes
    Compare {
        #[arg(long, default_value_t = 10)]
        from: usize,
        #[arg(long, default_value_t = 50)]
        to: usize,
        #[arg(long, default_value_t = 5)]
        step: usize,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        max_iterations: Option<usize>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_data(path: &Path) -> Result<ProblemData> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&source)?)
}

fn print_solution(solution: &Solution) {
    println!("Status: {} ({})", solution.status, solution.native_status);
    println!("Message: {}", solution.message);
    println!("Duration: {:.5}s", solution.duration_seconds());
    println!("Revenue: {:.3}", solution.revenue());
    println!("Margin: {:.3} (floor {:.3})", solution.margin(), solution.margin_floor);
    println!();
    println!(
        "{:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>10} {:>10}",
        "sku", "P", "C", "Q", "E", "x_opt", "P_opt", "Q_opt"
    );
    for row in &solution.data {
        let r = &row.record;
        println!(
            "{:>10} {:>10.2} {:>10.2} {:>10.3} {:>8.3} {:>8.4} {:>10.2} {:>10.3}",
            r.sku, r.price, r.cost, r.demand, r.elasticity, row.x_opt, row.price_opt, row.demand_opt
        );
    }
    if !solution.violations.is_empty() {
        println!();
        println!("Violations:");
        for v in &solution.violations {
            println!("  - {}", v.description);
        }
    }
}

fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Generate { n, seed, output } => {
            let data = generate::generate_data(n, seed)?;
            let json = serde_json::to_string_pretty(&data)?;
            match output {
                Some(path) => std::fs::write(&path, json).map_err(|source| CliError::Write {
                    path: path.display().to_string(),
                    source,
                })?,
                None => println!("{}", json),
            }
            Ok(true)
        }
        Commands::Solve {
            file,
            n,
            seed,
            solver,
            max_iterations,
            tolerance,
            format,
        } => {
            let data = match (file, n) {
                (Some(path), _) => read_data(&path)?,
                (None, Some(n)) => generate::generate_data(n, seed)?,
                (None, None) => return Err(CliError::NoInput),
            };
            debug!(skus = data.len(), m_min = data.baseline_margin(), "loaded catalog");

            let options = BackendOptions {
                max_iterations,
                tolerance,
            };
            let solution = pricing_optimization(&data, &solver, &options)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&solution.report())?);
            } else {
                print_solution(&solution);
            }
            Ok(solution.is_success())
        }
        Commands::Compare {
            from,
            to,
            step,
            seed,
            max_iterations,
        } => {
            let sizes = compare::sizes(from, to, step)?;
            let options = BackendOptions {
                max_iterations,
                tolerance: None,
            };
            let rows = compare::compare(&sizes, seed, &options)?;
            compare::print_table(&rows);
            Ok(true)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
