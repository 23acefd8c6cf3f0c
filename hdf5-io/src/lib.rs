#![deny(warnings)]

/// io for AnnData (.h5ad) files: var/obs annotations and dense or sparse expression layers
pub mod anndata;
