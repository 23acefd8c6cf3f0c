use ball_tree::{BallTree, Point};
use log::debug;
use rayon::prelude::*;

/// A point in the joint space under the Chebyshev (max-norm) metric
#[derive(Clone, Copy, PartialEq)]
struct Joint([f64; 2]);

impl Point for Joint {
    fn distance(&self, other: &Self) -> f64 {
        (self.0[0] - other.0[0]).abs().max((self.0[1] - other.0[1]).abs())
    }

    fn move_towards(&self, other: &Self, d: f64) -> Self {
        let total_dist = self.distance(other);
        let frac = if total_dist == 0.0 { 0.0 } else { d / total_dist };

        Joint([
            self.0[0] + frac * (other.0[0] - self.0[0]),
            self.0[1] + frac * (other.0[1] - self.0[1]),
        ])
    }
}

/// For each point `(x[i], y[i])`, the Chebyshev distance to its `k`-th nearest neighbor, not
/// counting the point itself. Requires `x.len() == y.len() > k >= 1`.
pub fn kth_neighbor_distances(x: &[f64], y: &[f64], k: usize) -> Vec<f64> {
    assert_eq!(x.len(), y.len());
    assert!(k >= 1 && k < x.len(), "need more than {} points, got {}", k, x.len());

    let points: Vec<Joint> = x.iter().zip(y).map(|(&a, &b)| Joint([a, b])).collect();
    let values: Vec<usize> = (0..points.len()).collect();
    debug!("constructing ball tree of {} points", points.len());
    let ball_tree = BallTree::new(points.clone(), values);

    let mut radii = vec![f64::INFINITY; points.len()];
    radii.par_iter_mut().enumerate().for_each_init(
        || ball_tree.query(),
        |query, (i, radius)| {
            let mut found = 0;
            for (_, d, &v) in query.nn(&points[i]).take(k + 1) {
                if v != i {
                    found += 1;
                    if found == k {
                        *radius = d;
                        break;
                    }
                }
            }
        },
    );
    radii
}
