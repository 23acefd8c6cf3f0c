// Mutual information between gene expression and pseudotime for one chunk of genes

use anyhow::{Context, Error};
use clap::builder::RangedU64ValueParser;
use clap::{value_parser, Arg, ArgAction, Command};
use log::info;
use pseudotime_mi::job::{JobIndex, SlurmEnv};
use pseudotime_mi::worker::{run_worker, DegeneratePolicy, WorkerConfig};
use snoop::BarSnoop;
use std::path::PathBuf;

pub fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("mi-worker")
        .about("Permutation test of mutual information between expression and pseudotime for one chunk of genes")
        .arg(
            Arg::new("H5AD")
                .help("AnnData file with expression layer and pseudotime")
                .long("h5ad")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("CHUNK")
                .help("Zero-based chunk index [default: $SLURM_ARRAY_TASK_ID]")
                .long("chunk")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("N_CHUNKS")
                .help("Number of chunks [default: size of the SLURM job array]")
                .long("n-chunks")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("LAYER")
                .help("Expression layer, or X for the main matrix")
                .long("layer")
                .default_value("log1p"),
        )
        .arg(
            Arg::new("PT_KEY")
                .help("obs column holding pseudotime")
                .long("pt-key")
                .default_value("dpt_pseudotime"),
        )
        .arg(
            Arg::new("PERMS")
                .help("Permutations including the observed value")
                .long("perms")
                .default_value("1001")
                .value_parser(RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("OUTDIR")
                .help("Output directory")
                .long("outdir")
                .default_value("./results")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("N_NEIGHBORS")
                .help("Neighbors used by the MI estimator")
                .long("n-neighbors")
                .default_value("3")
                .value_parser(RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("ON_DEGENERATE")
                .help(
                    "What to do with genes of constant (e.g. all-zero) or non-finite expression. \
                     All-zero genes are routine in unfiltered layers: with abort one of them fails \
                     the whole chunk, skip drops its row, sentinel writes NaN",
                )
                .long("on-degenerate")
                .default_value("abort")
                .value_parser(["abort", "skip", "sentinel"]),
        )
        .arg(
            Arg::new("THREADS")
                .help("Threads for the neighbor searches")
                .long("threads")
                .default_value("1")
                .value_parser(RangedU64ValueParser::<usize>::new().range(1..)),
        )
        .arg(
            Arg::new("QUIET")
                .help("Do not draw a progress bar")
                .long("quiet")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let h5ad: &PathBuf = matches.get_one("H5AD").unwrap();
    let job = JobIndex::resolve(
        matches.get_one("CHUNK").copied(),
        matches.get_one("N_CHUNKS").copied(),
        &SlurmEnv::from_env(),
    )?;
    let threads: usize = *matches.get_one("THREADS").unwrap();

    let mut config = WorkerConfig::new(h5ad, job);
    config.layer = matches.get_one::<String>("LAYER").unwrap().clone();
    config.pt_key = matches.get_one::<String>("PT_KEY").unwrap().clone();
    config.perms = *matches.get_one("PERMS").unwrap();
    config.n_neighbors = *matches.get_one("N_NEIGHBORS").unwrap();
    config.outdir = matches.get_one::<PathBuf>("OUTDIR").unwrap().clone();
    config.on_degenerate = matches.get_one::<String>("ON_DEGENERATE").unwrap().parse::<DegeneratePolicy>()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("could not set up the thread pool")?;

    let summary = if matches.get_flag("QUIET") {
        run_worker(&config, snoop::NoOpSnoop)?
    } else {
        run_worker(&config, BarSnoop::new(format!("chunk {:03}", job.chunk)))?
    };

    info!(
        "[worker {:03}] done: {} of {} genes written, {} skipped, {} NaN",
        job.chunk,
        summary.written,
        summary.chunk.len(),
        summary.skipped.len(),
        summary.sentinels.len()
    );
    Ok(())
}
