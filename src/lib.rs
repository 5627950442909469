//! Normalize raw TV dialogue transcripts into a speaker-resolved dataset.
//!
//! The library holds every stage; `main.rs` only wires them to the CLI.
//! See [`pipeline`] for the stage order and the files each stage reads and
//! writes.

pub mod assemble;
pub mod check;
pub mod clean;
pub mod compile;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod identifier;
pub mod mapping;
pub mod meta;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod store;

pub use config::Config;
pub use error::{PipelineError, Result};
