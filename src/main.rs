mod pipelines;
mod utils;
mod config;
mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use std::{env, fs};

use anyhow::Result;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use rayon::ThreadPoolBuilder;

use crate::cli::parse;
use crate::config::defs::{PipelineError, RunConfig};
use pipelines::{
    cluster, diffexpr, gene_filter, gtf_regions, logos, merge_counts, normalize, plot_tss,
    sam_filter, sampling, trim,
};

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n NADseq\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };
    let thread_pool = Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?,
    );
    info!("Using {} worker threads", threads);

    let out_dir = setup_output_dir(&args, &dir)?;
    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        out_dir,
        args,
        thread_pool,
    });

    if let Err(e) = match module.as_str() {
        "trim" => trim::run(run_config).await,
        "three_prime_gtf" => gtf_regions::three_prime_run(run_config).await,
        "intergenic_gtf" => gtf_regions::intergenic_run(run_config).await,
        "filter_sam" => sam_filter::run(run_config).await,
        "merge_counts" => merge_counts::run(run_config).await,
        "diff_expr" => diffexpr::diff_expr_run(run_config).await,
        "filter_results" => diffexpr::filter_results_run(run_config).await,
        "filter_gene_counts" => gene_filter::filter_gene_counts_run(run_config).await,
        "normalize_counts" => normalize::normalize_counts_run(run_config).await,
        "sample_normalizations" => sampling::run(run_config).await,
        "normalize_replicates" => normalize::normalize_replicates_run(run_config).await,
        "attach_stats" => gene_filter::attach_stats_run(run_config).await,
        "cluster" => cluster::run(run_config).await,
        "plot_tss" => plot_tss::plot_tss_run(run_config).await,
        "plot_internal_standards" => plot_tss::internal_standards_run(run_config).await,
        "logos" => logos::run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

/// Sets up the output directory.
/// Uses `--out` when given; otherwise falls back to the input directory, and
/// finally to the current working directory. Ensures the directory exists.
fn setup_output_dir(args: &cli::args::Arguments, cwd: &PathBuf) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        }
        None => match &args.in_dir {
            Some(in_dir) => {
                let path = PathBuf::from(in_dir);
                if path.is_absolute() {
                    path
                } else {
                    cwd.join(path)
                }
            }
            None => cwd.clone(),
        },
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
