//! Core types shared by the genome engine crates.

pub mod config;
pub mod error;

pub use config::{ColorTransitions, MutationParameters, MAX_COLORS};
pub use error::{GenomeError, Result};
