use anyhow::{bail, Error};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const PICKLE_SUFFIX: &str = ".pkl";

/// Inputs of one pairwise integration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrationRequest {
    /// short species identifier, e.g. `hs`
    pub species1: String,
    pub species2: String,
    /// expression data of each species, `.h5ad`
    pub data1: PathBuf,
    pub data2: PathBuf,
    /// directory of homology search results between the two proteomes
    pub maps: PathBuf,
    pub out: PathBuf,
    /// let the library also write its preprocessed `*_pr.h5ad` copies of the inputs
    pub save_processed: bool,
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

impl IntegrationRequest {
    /// Where the integrated object ends up: `out`, with `.pkl` appended unless the path already
    /// contains `.pkl` anywhere, the same rule `save_samap` applies.
    pub fn output_path(&self) -> PathBuf {
        if self.out.to_string_lossy().contains(PICKLE_SUFFIX) {
            return self.out.clone();
        }
        let mut name = OsString::from(self.out.as_os_str());
        name.push(PICKLE_SUFFIX);
        PathBuf::from(name)
    }

    /// Directory the output is written to
    pub fn output_dir(&self) -> PathBuf {
        parent_dir(&self.out).to_path_buf()
    }

    /// Check everything that can be checked before launching the integration.
    pub fn validate(&self) -> Result<(), Error> {
        for species in [&self.species1, &self.species2] {
            if species.trim().is_empty() {
                bail!("species identifiers must not be empty");
            }
        }
        if self.species1 == self.species2 {
            bail!("both datasets are labelled '{}', species must differ", self.species1);
        }

        for (species, data) in [(&self.species1, &self.data1), (&self.species2, &self.data2)] {
            if !data.is_file() {
                bail!("data for species '{}' not found: {}", species, data.display());
            }
        }
        if !self.maps.is_dir() {
            bail!("homology map directory not found: {}", self.maps.display());
        }

        let dir = parent_dir(&self.out);
        if !dir.is_dir() {
            bail!("output directory does not exist: {}", dir.display());
        }
        let out = self.output_path();
        if out.is_dir() {
            bail!("output path is a directory: {}", out.display());
        }
        Ok(())
    }
}
