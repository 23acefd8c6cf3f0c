//! Mutual information between two continuous variables with the Kraskov-Stögbauer-Grassberger
//! nearest-neighbor estimator (their "algorithm 1").
//!
//! Both variables are scaled to unit variance and perturbed with noise of relative size 1e-10 so
//! that tied values (very common for zero expression) do not collapse the neighbor counts. For a
//! sample of size `n` and `k` neighbors:
//!
//! `I(X; Y) = psi(n) + psi(k) - <psi(n_x + 1)> - <psi(n_y + 1)>`
//!
//! where `n_x(i)` counts the points strictly closer than the `k`-th joint-space neighbor of point
//! `i` when only the x coordinate is considered, and likewise for `n_y`. Negative estimates are
//! clamped to zero.

use crate::knn::kth_neighbor_distances;
use anyhow::{bail, Error};
use cephes::psi;
use ndarray::ArrayView1;
use rand::Rng;
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;

/// Number of neighbors used unless configured otherwise
pub const DEFAULT_NEIGHBORS: usize = 3;

const JITTER: f64 = 1e-10;

/// Random stream for jitter of the pseudotime vector
pub const PSEUDOTIME_STREAM: u128 = 0;
/// Random stream for jitter of gene expression vectors
pub const GENE_STREAM: u128 = 1;

/// Deterministic jitter generator; `key` is the chunk index for pseudotime and the global gene
/// index for expression vectors.
pub fn jitter_rng(stream: u128, key: u64) -> Pcg64 {
    Pcg64::new(key as u128, stream)
}

/// A variable scaled to unit variance with tie-breaking jitter, plus a sorted copy used for the
/// marginal neighbor counts.
#[derive(Clone, Debug)]
pub struct Marginal {
    values: Vec<f64>,
    sorted: Vec<f64>,
}

impl Marginal {
    /// Fails for empty, constant or non-finite input.
    pub fn prepare(raw: ArrayView1<f64>, rng: &mut impl Rng) -> Result<Marginal, Error> {
        if raw.is_empty() {
            bail!("no values");
        }
        if let Some((i, v)) = raw.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            bail!("non-finite value {} at position {}", v, i);
        }
        let first = raw[0];
        if raw.iter().all(|&v| v == first) {
            bail!("zero variance: all {} values equal {}", raw.len(), first);
        }

        let n = raw.len() as f64;
        let mean = raw.sum() / n;
        let std = (raw.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if !(std > 0.0 && std.is_finite()) {
            bail!("degenerate standard deviation {}", std);
        }

        let scaled: Vec<f64> = raw.iter().map(|v| v / std).collect();
        let mean_abs = scaled.iter().map(|v| v.abs()).sum::<f64>() / n;
        let amplitude = JITTER * mean_abs.max(1.0);
        let values: Vec<f64> = scaled
            .into_iter()
            .map(|v| v + amplitude * rng.sample::<f64, _>(StandardNormal))
            .collect();

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Ok(Marginal { values, sorted })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// prepared values in sample order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// prepared values in ascending order; invariant under permutation of the sample
    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }
}

/// Number of entries of `sorted` within `radius` of `center`, minus one for the center itself
fn count_within(sorted: &[f64], center: f64, radius: f64) -> usize {
    let lo = sorted.partition_point(|&v| v < center - radius);
    let hi = sorted.partition_point(|&v| v <= center + radius);
    (hi - lo).saturating_sub(1)
}

// largest float below r, so that the marginal counts are strictly inside the joint radius
fn next_toward_zero(r: f64) -> f64 {
    if r > 0.0 {
        f64::from_bits(r.to_bits() - 1)
    } else {
        r
    }
}

/// Check that a sample of `n_x` and `n_y` values supports a `k`-neighbor estimate
pub fn check_sample(n_x: usize, n_y: usize, k: usize) -> Result<(), Error> {
    if k == 0 {
        bail!("number of neighbors must be at least 1");
    }
    if n_x != n_y {
        bail!("sample sizes differ: {} vs {}", n_x, n_y);
    }
    if n_x <= k {
        bail!("{} samples are too few for {} neighbors", n_x, k);
    }
    Ok(())
}

/// KSG estimate from prepared values. `x_sorted` and `y_sorted` must hold the same values as
/// `x` and `y` in ascending order; the sizes must have passed [`check_sample`].
pub fn ksg_estimate(x: &[f64], x_sorted: &[f64], y: &[f64], y_sorted: &[f64], k: usize) -> f64 {
    let n = x.len();
    let radii = kth_neighbor_distances(x, y, k);

    // sequential sums keep the result independent of the thread count
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for i in 0..n {
        let r = next_toward_zero(radii[i]);
        sum_x += psi((count_within(x_sorted, x[i], r) + 1) as f64);
        sum_y += psi((count_within(y_sorted, y[i], r) + 1) as f64);
    }

    let n_f = n as f64;
    let mi = psi(n_f) + psi(k as f64) - sum_x / n_f - sum_y / n_f;
    mi.max(0.0)
}

/// Estimate the mutual information (in nats) between `x` and `y` with `k` neighbors.
pub fn mutual_info(x: ArrayView1<f64>, y: ArrayView1<f64>, k: usize, rng: &mut impl Rng) -> Result<f64, Error> {
    check_sample(x.len(), y.len(), k)?;
    let x = Marginal::prepare(x, rng)?;
    let y = Marginal::prepare(y, rng)?;
    Ok(ksg_estimate(x.values(), x.sorted(), y.values(), y.sorted(), k))
}
