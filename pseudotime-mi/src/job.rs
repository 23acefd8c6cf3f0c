use anyhow::{bail, format_err, Context, Error};

pub const TASK_ID_VAR: &str = "SLURM_ARRAY_TASK_ID";
pub const TASK_MIN_VAR: &str = "SLURM_ARRAY_TASK_MIN";
pub const TASK_MAX_VAR: &str = "SLURM_ARRAY_TASK_MAX";

/// Snapshot of the SLURM job-array variables a worker consults
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlurmEnv {
    pub task_id: Option<String>,
    pub task_min: Option<String>,
    pub task_max: Option<String>,
}

fn parse_var(name: &str, value: &str) -> Result<i64, Error> {
    value
        .trim()
        .parse::<i64>()
        .with_context(|| format!("{name}={value:?} is not an integer"))
}

impl SlurmEnv {
    /// Capture the variables from the process environment
    pub fn from_env() -> SlurmEnv {
        SlurmEnv::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SlurmEnv {
        SlurmEnv {
            task_id: lookup(TASK_ID_VAR),
            task_min: lookup(TASK_MIN_VAR),
            task_max: lookup(TASK_MAX_VAR),
        }
    }

    /// Chunk index from `SLURM_ARRAY_TASK_ID`, if set
    pub fn chunk(&self) -> Result<Option<usize>, Error> {
        let Some(value) = &self.task_id else { return Ok(None) };
        let id = parse_var(TASK_ID_VAR, value)?;
        let id = usize::try_from(id).map_err(|_| format_err!("{TASK_ID_VAR}={id} is negative"))?;
        Ok(Some(id))
    }

    /// Chunk count as the size of the job array, `MAX - MIN + 1`, if both bounds are set
    pub fn n_chunks(&self) -> Result<Option<usize>, Error> {
        let (Some(min), Some(max)) = (&self.task_min, &self.task_max) else {
            return Ok(None);
        };
        let min = parse_var(TASK_MIN_VAR, min)?;
        let max = parse_var(TASK_MAX_VAR, max)?;
        if max < min {
            bail!("{TASK_MAX_VAR}={max} is smaller than {TASK_MIN_VAR}={min}");
        }
        let size = max
            .checked_sub(min)
            .and_then(|d| d.checked_add(1))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| format_err!("job array {TASK_MIN_VAR}={min}..{TASK_MAX_VAR}={max} is too large"))?;
        Ok(Some(size))
    }
}

/// Which chunk this worker handles, out of how many
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobIndex {
    pub chunk: usize,
    pub n_chunks: usize,
}

impl JobIndex {
    /// Explicit values win; the environment is only consulted for values not given.
    pub fn resolve(chunk: Option<usize>, n_chunks: Option<usize>, env: &SlurmEnv) -> Result<JobIndex, Error> {
        let chunk = match chunk {
            Some(c) => c,
            None => env
                .chunk()?
                .ok_or_else(|| format_err!("no chunk index: pass --chunk or set {TASK_ID_VAR}"))?,
        };
        let n_chunks = match n_chunks {
            Some(n) => n,
            None => env.n_chunks()?.ok_or_else(|| {
                format_err!("no chunk count: pass --n-chunks or set {TASK_MIN_VAR} and {TASK_MAX_VAR}")
            })?,
        };

        if n_chunks == 0 {
            bail!("number of chunks must be at least 1");
        }
        if chunk >= n_chunks {
            bail!(
                "chunk index {} is out of range for {} chunks (chunk indices are zero-based)",
                chunk,
                n_chunks
            );
        }
        Ok(JobIndex { chunk, n_chunks })
    }
}
