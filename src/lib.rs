//! salesnet: hierarchical sales network of manufacturers, distributors and retailers.
//!
//! Layers follow the dependency direction `cli -> infrastructure -> application -> domain`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
