//! Configuration, execution and result handling for the Gudrun
//! neutron-scattering data-reduction engine.
//!
//! The engine itself is an external program; this crate reads and writes
//! its line-oriented input files, drives it (once, iteratively, or inside a
//! composition search), and organises what it leaves behind.

pub mod common;
pub mod composition;
pub mod config;
pub mod domain;
pub mod engine;
pub mod iterate;
pub mod numerics;
pub mod output;
pub mod parser;
pub mod report;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use config::{GudrunFile, SampleLocator};
pub use domain::{GudrunError, GudrunResult};
pub use output::GudrunOutput;
pub use report::GudFile;
pub use runner::GudrunRunner;
