use crate::chunk::ChunkRange;
use crate::job::JobIndex;
use crate::mi::{check_sample, jitter_rng, Marginal, DEFAULT_NEIGHBORS, GENE_STREAM, PSEUDOTIME_STREAM};
use crate::output::ChunkOutput;
use crate::permutation::{GeneRecord, PermutationTest};
use anyhow::{bail, Context, Error};
use hdf5_io::anndata::AnnData;
use itertools::Itertools;
use log::{info, warn};
use snoop::Progress;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_LAYER: &str = "log1p";
pub const DEFAULT_PT_KEY: &str = "dpt_pseudotime";
pub const DEFAULT_PERMS: usize = 1001;
pub const DEFAULT_OUTDIR: &str = "results";

/// What to do with a gene the estimator rejects (constant or non-finite expression).
///
/// A gene with zero counts in every cell is constant, so unfiltered layers routinely contain such
/// genes; under `Abort` a single one fails its chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegeneratePolicy {
    /// fail the whole chunk, nothing is written
    Abort,
    /// leave the gene out of the results table
    Skip,
    /// write a row of NaN
    Sentinel,
}

impl DegeneratePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegeneratePolicy::Abort => "abort",
            DegeneratePolicy::Skip => "skip",
            DegeneratePolicy::Sentinel => "sentinel",
        }
    }
}

impl FromStr for DegeneratePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "abort" => DegeneratePolicy::Abort,
            "skip" => DegeneratePolicy::Skip,
            "sentinel" => DegeneratePolicy::Sentinel,
            _ => bail!("unknown degenerate-gene policy '{}', expected abort, skip or sentinel", s),
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub h5ad: PathBuf,
    pub job: JobIndex,
    pub layer: String,
    pub pt_key: String,
    /// total permutations including the observed value
    pub perms: usize,
    pub n_neighbors: usize,
    pub outdir: PathBuf,
    pub on_degenerate: DegeneratePolicy,
}

impl WorkerConfig {
    pub fn new(h5ad: impl Into<PathBuf>, job: JobIndex) -> WorkerConfig {
        WorkerConfig {
            h5ad: h5ad.into(),
            job,
            layer: DEFAULT_LAYER.to_string(),
            pt_key: DEFAULT_PT_KEY.to_string(),
            perms: DEFAULT_PERMS,
            n_neighbors: DEFAULT_NEIGHBORS,
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            on_degenerate: DegeneratePolicy::Abort,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerSummary {
    pub chunk: ChunkRange,
    pub output: ChunkOutput,
    /// rows written to the results table
    pub written: usize,
    pub skipped: Vec<String>,
    pub sentinels: Vec<String>,
}

/// Compute the MI permutation test for every gene of this worker's chunk and write
/// `mi_NNN.csv` and `chunk_NNN.txt`. Nothing is written if the run fails.
pub fn run_worker(config: &WorkerConfig, mut progress: impl Progress) -> Result<WorkerSummary, Error> {
    let chunk_id = config.job.chunk;
    let tag = format!("[worker {chunk_id:03}]");
    let test = PermutationTest::new(config.perms, config.n_neighbors, chunk_id as u64)?;

    info!("{} reading {}", tag, config.h5ad.display());
    let adata = AnnData::open(&config.h5ad)?;
    let var_names = adata.var_names()?;
    let (n_obs, n_vars) = adata.layer_shape(&config.layer)?;
    if var_names.len() != n_vars {
        bail!(
            "{}: layer '{}' has {} genes but var has {} names",
            config.h5ad.display(),
            config.layer,
            n_vars,
            var_names.len()
        );
    }

    let pseudotime = adata.obs_column(&config.pt_key)?;
    if pseudotime.len() != n_obs {
        bail!(
            "{}: obs column '{}' has {} values for {} cells",
            config.h5ad.display(),
            config.pt_key,
            pseudotime.len(),
            n_obs
        );
    }
    check_sample(n_obs, n_obs, test.n_neighbors()).with_context(|| config.h5ad.display().to_string())?;
    let covariate = Marginal::prepare(pseudotime.view(), &mut jitter_rng(PSEUDOTIME_STREAM, chunk_id as u64))
        .with_context(|| format!("pseudotime column '{}'", config.pt_key))?;

    let chunk = ChunkRange::new(n_vars, config.job.n_chunks, chunk_id)?;
    let genes = &var_names[chunk.range()];
    let expression = adata.layer_columns(&config.layer, chunk.range())?;
    info!("{} {} genes ({}:{})", tag, genes.len(), chunk.start, chunk.end);

    let mut records = Vec::with_capacity(genes.len());
    let mut skipped = Vec::new();
    let mut sentinels = Vec::new();

    progress.start(genes.len() as u64);
    for (j, gene) in genes.iter().enumerate() {
        let gene_index = (chunk.start + j) as u64;
        let result = Marginal::prepare(expression.column(j), &mut jitter_rng(GENE_STREAM, gene_index))
            .and_then(|x| test.run(gene, &x, &covariate));

        match (result, config.on_degenerate) {
            (Ok(record), _) => records.push(record),
            (Err(e), DegeneratePolicy::Abort) => {
                progress.finish();
                return Err(e.context(format!(
                    "gene {} (index {}) cannot be tested; the skip or sentinel policy keeps the chunk going",
                    gene, gene_index
                )));
            }
            (Err(e), DegeneratePolicy::Skip) => {
                warn!("{} skipping gene {}: {:#}", tag, gene, e);
                skipped.push(gene.clone());
            }
            (Err(e), DegeneratePolicy::Sentinel) => {
                warn!("{} gene {} gets NaN statistics: {:#}", tag, gene, e);
                records.push(GeneRecord::sentinel(gene, test.null_count()));
                sentinels.push(gene.clone());
            }
        }
        progress.inc(1);
    }
    progress.finish();

    if !skipped.is_empty() {
        warn!("{} skipped {} genes: {}", tag, skipped.len(), skipped.iter().join(", "));
    }

    let output = ChunkOutput::new(&config.outdir, chunk_id);
    output.write(test.null_count(), &records, genes)?;
    info!("{} wrote {}", tag, output.results_path().display());

    Ok(WorkerSummary {
        chunk,
        output,
        written: records.len(),
        skipped,
        sentinels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names() {
        for policy in [DegeneratePolicy::Abort, DegeneratePolicy::Skip, DegeneratePolicy::Sentinel] {
            assert_eq!(policy.as_str().parse::<DegeneratePolicy>().unwrap(), policy);
        }
        assert!("ignore".parse::<DegeneratePolicy>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::new("data.h5ad", JobIndex { chunk: 0, n_chunks: 1 });
        assert_eq!(config.layer, "log1p");
        assert_eq!(config.pt_key, "dpt_pseudotime");
        assert_eq!(config.perms, 1001);
        assert_eq!(config.n_neighbors, 3);
        assert_eq!(config.outdir, PathBuf::from("results"));
        assert_eq!(config.on_degenerate, DegeneratePolicy::Abort);
    }
}
