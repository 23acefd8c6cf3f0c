use crate::mi::{check_sample, ksg_estimate, Marginal};
use anyhow::{bail, Error};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// `(count(null >= observed) + 1) / (n_null + 1)`, always in `(0, 1]`
pub fn empirical_p(observed: f64, null: &[f64]) -> f64 {
    let hits = null.iter().filter(|&&v| v >= observed).count();
    (hits + 1) as f64 / (null.len() + 1) as f64
}

/// Observed MI, permutation null and p-value for one gene
#[derive(Clone, Debug, PartialEq)]
pub struct GeneRecord {
    pub gene: String,
    pub mi: f64,
    pub p: f64,
    pub null: Vec<f64>,
}

impl GeneRecord {
    /// Row with every statistic set to NaN, for genes the estimator could not handle
    pub fn sentinel(gene: &str, null_count: usize) -> GeneRecord {
        GeneRecord {
            gene: gene.to_string(),
            mi: f64::NAN,
            p: f64::NAN,
            null: vec![f64::NAN; null_count],
        }
    }
}

/// Permutation test of gene expression against a shared covariate.
///
/// The shuffle generator is re-seeded for every gene, so the `i`-th null value of every gene is
/// computed against the same shuffled covariate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermutationTest {
    perms: usize,
    n_neighbors: usize,
    seed: u64,
}

impl PermutationTest {
    /// `perms` counts the observed value, so `perms - 1` shuffles are drawn.
    pub fn new(perms: usize, n_neighbors: usize, seed: u64) -> Result<PermutationTest, Error> {
        if perms == 0 {
            bail!("number of permutations must be at least 1 (the observed value)");
        }
        if n_neighbors == 0 {
            bail!("number of neighbors must be at least 1");
        }
        Ok(PermutationTest {
            perms,
            n_neighbors,
            seed,
        })
    }

    pub fn perms(&self) -> usize {
        self.perms
    }

    pub fn null_count(&self) -> usize {
        self.perms - 1
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The shuffle generator every gene starts from
    pub fn shuffle_rng(&self) -> Pcg64Mcg {
        Pcg64Mcg::seed_from_u64(self.seed)
    }

    /// Observed MI and the null vector of `x` against `covariate`
    pub fn statistics(&self, x: &Marginal, covariate: &Marginal) -> Result<(f64, Vec<f64>), Error> {
        check_sample(x.len(), covariate.len(), self.n_neighbors)?;
        let k = self.n_neighbors;
        let observed = ksg_estimate(x.values(), x.sorted(), covariate.values(), covariate.sorted(), k);

        let mut rng = self.shuffle_rng();
        let mut shuffled = covariate.values().to_vec();
        let null = (0..self.null_count())
            .map(|_| {
                shuffled.shuffle(&mut rng);
                ksg_estimate(x.values(), x.sorted(), &shuffled, covariate.sorted(), k)
            })
            .collect();
        Ok((observed, null))
    }

    pub fn run(&self, gene: &str, x: &Marginal, covariate: &Marginal) -> Result<GeneRecord, Error> {
        let (mi, null) = self.statistics(x, covariate)?;
        Ok(GeneRecord {
            gene: gene.to_string(),
            mi,
            p: empirical_p(mi, &null),
            null,
        })
    }
}
