use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dualtree::io::read_points;
use dualtree::policy::{NeighborResult, PolicyRegistry};
use dualtree::{
    DualTreeEngine, EngineConfig, Gnp, KdTree, KernelSum, KernelSumParam, NearestNeighbor,
    NearestNeighborParam, RangeCount, RangeCountParam, TraversalOutput,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dualtree", about = "Dual-tree solvers for generalized N-body problems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Nearest reference point of every query point.
    Neighbors {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Number of reference points within a radius of every query point.
    RangeCount {
        #[command(flatten)]
        data: DataArgs,
        /// Inclusive search radius.
        #[arg(long)]
        radius: f64,
        /// Saturate counts at this value.
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Gaussian kernel density estimate at every query point.
    Kde {
        #[command(flatten)]
        data: DataArgs,
        /// Kernel bandwidth.
        #[arg(long)]
        bandwidth: f64,
        /// Relative error tolerance.
        #[arg(long, default_value_t = 0.01)]
        epsilon: f64,
    },
    /// List available policies.
    List,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Reference points (one per line, whitespace or comma separated).
    references: PathBuf,
    /// Query points (default: the reference points, each excluding itself).
    #[arg(long)]
    queries: Option<PathBuf>,
    /// Maximum points per tree leaf.
    #[arg(long, default_value_t = 16)]
    leaf_size: usize,
    /// Skip pruning and evaluate every pair.
    #[arg(long)]
    naive: bool,
    /// Also run the exhaustive traversal and report the largest discrepancy.
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Neighbors { data } => run_neighbors(&data)?,
        Commands::RangeCount { data, radius, limit } => run_range_count(&data, radius, limit)?,
        Commands::Kde {
            data,
            bandwidth,
            epsilon,
        } => run_kde(&data, bandwidth, epsilon)?,
        Commands::List => run_list(),
    }

    Ok(())
}

/// Reference and query sets, each permuted into its tree's order
struct Dataset {
    references: Vec<Vec<f64>>,
    r_tree: KdTree,
    queries: Option<(Vec<Vec<f64>>, KdTree)>,
}

impl Dataset {
    fn load(args: &DataArgs) -> Result<Self> {
        let mut references = read_points(&args.references)
            .with_context(|| format!("failed to read points from {}", args.references.display()))?;
        let r_tree = KdTree::build(&mut references, args.leaf_size).context("failed to build reference tree")?;

        let queries = match &args.queries {
            Some(path) => {
                let mut queries =
                    read_points(path).with_context(|| format!("failed to read points from {}", path.display()))?;
                if queries[0].len() != references[0].len() {
                    anyhow::bail!(
                        "query dimension {} does not match reference dimension {}",
                        queries[0].len(),
                        references[0].len()
                    );
                }
                let q_tree = KdTree::build(&mut queries, args.leaf_size).context("failed to build query tree")?;
                Some((queries, q_tree))
            }
            None => None,
        };

        info!(
            references = references.len(),
            queries = queries.as_ref().map_or(references.len(), |(q, _)| q.len()),
            dim = references[0].len(),
            leaf_size = args.leaf_size,
            "loaded point sets"
        );
        Ok(Self {
            references,
            r_tree,
            queries,
        })
    }

    fn leave_one_out(&self) -> bool {
        self.queries.is_none()
    }

    fn query_tree(&self) -> &KdTree {
        self.queries.as_ref().map_or(&self.r_tree, |(_, tree)| tree)
    }

    fn query_points(&self) -> &[Vec<f64>] {
        self.queries.as_ref().map_or(&self.references, |(points, _)| points)
    }

    fn run<G>(&self, param: G::Param, naive: bool, leave_one_out: bool) -> Result<TraversalOutput<G>>
    where
        G: Gnp<QPoint = Vec<f64>, RPoint = Vec<f64>>,
    {
        let config = EngineConfig::new()
            .with_naive(naive)
            .with_leave_one_out(leave_one_out);
        let output = DualTreeEngine::<G>::new(param, config)
            .run_trees(self.query_tree(), self.query_points(), &self.r_tree, &self.references)
            .with_context(|| format!("{} traversal failed", G::name()))?;
        info!(policy = G::name(), naive, stats = %output.stats, "traversal complete");
        Ok(output)
    }

    /// Per-query results in the order the query file listed them
    fn in_input_order<T>(&self, results: Vec<T>) -> Result<Vec<T>> {
        Ok(self.query_tree().to_original_order(results)?)
    }
}

fn run_neighbors(args: &DataArgs) -> Result<()> {
    let data = Dataset::load(args)?;
    let loo = data.leave_one_out();
    let param = NearestNeighborParam::new().with_leave_one_out(loo);
    let output = data.run::<NearestNeighbor>(param.clone(), args.naive, loo)?;
    info!(pruned_fraction = output.global.pairs.pruned_fraction(), "pair ledger");

    if args.verify {
        let naive = data.run::<NearestNeighbor>(param, true, loo)?;
        let discrepancy = output
            .results
            .iter()
            .zip(&naive.results)
            .map(|(a, b)| distance_gap(a, b))
            .fold(0.0, f64::max);
        info!(max_distance_discrepancy = discrepancy, "verified against exhaustive run");
    }

    let old_from_new = data.r_tree.old_from_new();
    for (i, result) in data.in_input_order(output.results)?.into_iter().enumerate() {
        match result.index {
            Some(index) => println!("{}\t{}\t{:.6}", i, old_from_new[index], result.distance()),
            None => println!("{i}\t-\tinf"),
        }
    }

    Ok(())
}

fn distance_gap(a: &NeighborResult, b: &NeighborResult) -> f64 {
    if a.distance_sq == b.distance_sq {
        return 0.0;
    }
    (a.distance() - b.distance()).abs()
}

fn run_range_count(args: &DataArgs, radius: f64, limit: Option<u64>) -> Result<()> {
    let data = Dataset::load(args)?;
    let loo = data.leave_one_out();
    let mut param = RangeCountParam::new(radius)?.with_leave_one_out(loo);
    if let Some(limit) = limit {
        param = param.with_limit(limit);
    }
    let output = data.run::<RangeCount>(param.clone(), args.naive, loo)?;
    info!(
        total_neighbors = output.global.total_neighbors,
        pruned_fraction = output.global.pairs.pruned_fraction(),
        "pair ledger"
    );

    if args.verify {
        let naive = data.run::<RangeCount>(param, true, loo)?;
        let discrepancy = output
            .results
            .iter()
            .zip(&naive.results)
            .map(|(a, b)| a.count.abs_diff(b.count))
            .max()
            .unwrap_or(0);
        info!(max_count_discrepancy = discrepancy, "verified against exhaustive run");
    }

    for (i, result) in data.in_input_order(output.results)?.into_iter().enumerate() {
        println!("{}\t{}", i, result.count);
    }

    Ok(())
}

fn run_kde(args: &DataArgs, bandwidth: f64, epsilon: f64) -> Result<()> {
    let data = Dataset::load(args)?;
    let param = KernelSumParam::new(bandwidth, epsilon, data.references.len())?;
    // self pairs are part of the density estimate
    let output = data.run::<KernelSum>(param.clone(), args.naive, false)?;
    info!(
        mean_density = output.global.mean_density(),
        pruned_fraction = output.global.pairs.pruned_fraction(),
        "pair ledger"
    );

    if args.verify {
        let naive = data.run::<KernelSum>(param, true, false)?;
        let discrepancy = output
            .results
            .iter()
            .zip(&naive.results)
            .filter(|(_, exact)| exact.density > 0.0)
            .map(|(approx, exact)| (approx.density - exact.density).abs() / exact.density)
            .fold(0.0, f64::max);
        info!(max_relative_error = discrepancy, epsilon, "verified against exhaustive run");
    }

    for (i, result) in data.in_input_order(output.results)?.into_iter().enumerate() {
        println!("{}\t{:.6e}", i, result.density);
    }

    Ok(())
}

fn run_list() {
    for info in PolicyRegistry::with_builtin().list() {
        let kind = if info.exact { "exact" } else { "approximate" };
        println!("{:<12} {:<12} {}", info.name, kind, info.description);
    }
}
