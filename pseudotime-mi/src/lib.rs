//! # pseudotime-mi: gene / pseudotime mutual information with permutation tests

#![deny(warnings)]

/// Partitioning of the gene axis into chunks
pub mod chunk;

/// Chunk index and count from flags or the SLURM job array
pub mod job;

/// Nearest-neighbor radii in the joint (expression, pseudotime) space
pub mod knn;

/// KSG mutual information estimator
pub mod mi;

/// Permutation null distributions and empirical p-values
pub mod permutation;

/// Per-chunk result files
pub mod output;

/// One chunk worker, end to end
pub mod worker;
