//! md-monitor - Tail GROMACS/PLUMED output into an experiment tracker.

pub mod config;
pub mod display;
pub mod monitor;
pub mod parsers;
pub mod process;
pub mod sink;
pub mod tools;
