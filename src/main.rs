//! ndflow CLI
//!
//! A demonstration front end: list the built-in nodes, or smooth a grayscale
//! image through a streamed reader → filter pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};
use ndflow::filters::builtin::write_image;
use ndflow::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ndflow", version, about = "Demand-driven N-dimensional image pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all available nodes
    List {
        /// Print the node metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show ports and parameters of one node
    Info { id: String },
    /// Smooth a 2-D grayscale image, streaming it in pieces
    Smooth(SmoothArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Kernel {
    Mean,
    Gaussian,
}

#[derive(Args)]
struct SmoothArgs {
    input: PathBuf,
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = Kernel::Mean)]
    filter: Kernel,
    /// Mean window half width
    #[arg(long, default_value_t = 1)]
    radius: i64,
    /// Gaussian variance
    #[arg(long, default_value_t = 1.0)]
    variance: f64,
    /// nearest, mirror, periodic or constant
    #[arg(long, default_value = "nearest")]
    boundary: String,
    #[arg(long)]
    memory_limit_mb: Option<usize>,
    /// Fixed number of pieces, overriding the memory limit
    #[arg(long)]
    pieces: Option<usize>,
    #[arg(long)]
    threads: Option<usize>,
    /// TOML file with update options; flags override it
    #[arg(long, env = "NDFLOW_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::List { json } => list_nodes(json),
        Command::Info { id } => node_info(&id),
        Command::Smooth(args) => smooth(args),
    }
}

fn list_nodes(json: bool) -> Result<()> {
    let registry = FilterRegistry::with_builtins();
    let grouped = registry.grouped_by_category();

    if json {
        println!("{}", serde_json::to_string_pretty(&grouped)?);
        return Ok(());
    }

    println!("Available nodes ({} total):", registry.len());
    for (category, nodes) in grouped {
        println!();
        println!("  {}", category.display_name());
        for metadata in nodes {
            println!("    {:<20} {}", metadata.id, metadata.description);
        }
    }
    Ok(())
}

fn node_info(id: &str) -> Result<()> {
    let registry = FilterRegistry::with_builtins();
    let metadata = registry
        .get_metadata(id)
        .with_context(|| format!("no node '{id}'; use 'list' to see available nodes"))?;

    println!("{} ({})", metadata.name, metadata.id);
    println!("Category: {}", metadata.category.display_name());
    println!("{}", metadata.description);

    for port in &metadata.inputs {
        let optional = if port.optional { " (optional)" } else { "" };
        println!("  input  {} [{}]{}", port.name, port.port_type, optional);
    }
    for port in &metadata.outputs {
        println!("  output {} [{}]", port.name, port.port_type);
    }
    for param in &metadata.parameters {
        println!("  param  {} [{}] = {}", param.name, param.param_type, param.default_value);
        if !param.description.is_empty() {
            println!("         {}", param.description);
        }
    }
    Ok(())
}

fn update_options(args: &SmoothArgs) -> Result<UpdateOptions> {
    let mut options = match &args.config {
        Some(path) => UpdateOptions::from_toml_file(path)
            .with_context(|| format!("reading options from {}", path.display()))?,
        None => UpdateOptions::new(),
    };
    if let Some(mb) = args.memory_limit_mb {
        options = options.with_memory_limit_mb(mb);
    }
    if let Some(pieces) = args.pieces {
        options = options.with_stream_pieces(pieces);
    }
    if let Some(threads) = args.threads {
        options = options.with_threads(threads);
    }
    Ok(options.with_progress(|update| match update {
        ProgressUpdate::PieceStarted { index, total, region } => {
            info!("Piece {}/{}: {}", index + 1, total, region);
        }
        ProgressUpdate::NodeCompleted {
            node_id, duration_ms, ..
        } => {
            debug!("Node {} finished in {}ms", node_id, duration_ms);
        }
        _ => {}
    }))
}

fn smooth(args: SmoothArgs) -> Result<()> {
    let options = update_options(&args)?;
    let registry = FilterRegistry::with_builtins();
    let mut graph = PipelineGraph::new();

    let reader = graph.add_node(registry.create("image_file_reader")?);
    graph.set_parameter(reader, "path", args.input.to_string_lossy().into_owned())?;

    let filter = match args.filter {
        Kernel::Mean => {
            let id = graph.add_node(registry.create("mean")?);
            graph.set_parameter(id, "radius", vec![args.radius])?;
            id
        }
        Kernel::Gaussian => {
            let id = graph.add_node(registry.create("discrete_gaussian")?);
            graph.set_parameter(id, "variance", args.variance)?;
            id
        }
    };
    graph.set_parameter(filter, "boundary", args.boundary.as_str())?;
    graph.connect(reader, "output", filter, "input")?;

    let engine = ExecutionEngine::with_options(options);
    let (image, report) = engine
        .update_streamed(&mut graph, filter, "output")
        .with_context(|| format!("smoothing {}", args.input.display()))?;
    write_image(&args.output, &image)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "Wrote {} ({}) in {} piece(s), {:?}",
        args.output.display(),
        image.buffered_region(),
        report.pieces,
        report.duration
    );
    Ok(())
}
