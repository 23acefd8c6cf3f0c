//! Cross-species integration of two single-cell datasets with SAMap.
//!
//! The alignment itself happens in the SAMap Python library. This crate checks the inputs,
//! launches the library and commits its pickled output to the requested path, so that a run
//! leaves either exactly one artifact or none.

#![deny(warnings)]

pub mod integrator;
pub mod request;

pub use integrator::{run_integration, Integrator, SamapProcess};
pub use request::IntegrationRequest;
