use cldera_utils::commands::{
    compute_stats::{self, ComputeStatsArgs},
    ensemble::{self, EnsembleArgs},
    generate_config::{self, GenerateConfigArgs},
    masks::{self, IpccMasksArgs, MaskArgs},
    plot::{self, PlotArgs},
    region_mean::{self, RegionMeanArgs},
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand)]
enum Command {
    /// Label columns with the IPCC AR6 reference region containing them
    IpccMasks(IpccMasksArgs),
    /// Label columns with one of 7 latitude bands
    ZonalMasks(MaskArgs),
    /// Label every column with region 0
    GlobalMask(MaskArgs),
    /// Area-weighted regional means (or integrals) of every per-column field
    RegionMean(RegionMeanArgs),
    /// Mean and sample standard deviation across ensemble members
    EnsembleMeanStd(EnsembleArgs),
    /// Write the YAML configuration of the profiling tool
    GenerateConfig(GenerateConfigArgs),
    /// Evaluate the stats of a profiling configuration on a dataset
    ComputeStats(ComputeStatsArgs),
    /// Plot a field, or a region-reduced field, on a lat/lon raster
    Plot(PlotArgs),
}

#[derive(Parser)]
#[command(name = "cldera-utils")]
#[command(version)]
#[command(about = "Region masks and regional statistics for climate model output")]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    colored::control::set_override(!args.no_color);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cldera_utils=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!args.no_color)
        .init();

    if let Err(e) = run(args.command).await {
        eprintln!("Error: {}", e);

        // Print the error chain for better context
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        println!("OVERALL STATUS: {}", "FAIL".red().bold());
        process::exit(1);
    }

    println!("OVERALL STATUS: {}", "PASS".green().bold());
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::IpccMasks(args) => masks::run_ipcc(&args).await.map(drop),
        Command::ZonalMasks(args) => masks::run_zonal(&args).await.map(drop),
        Command::GlobalMask(args) => masks::run_global(&args).await.map(drop),
        Command::RegionMean(args) => region_mean::run(&args).await.map(drop),
        Command::EnsembleMeanStd(args) => ensemble::run(&args).await.map(drop),
        Command::GenerateConfig(args) => generate_config::run(&args).await.map(drop),
        Command::ComputeStats(args) => compute_stats::run(&args).await.map(drop),
        Command::Plot(args) => plot::run(&args).await,
    }
}
