#![deny(warnings)]

mod polevl;
mod psi;


pub use psi::psi;
