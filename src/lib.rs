pub mod aggregate;
pub mod classify;
pub mod cleaner;
pub mod cli;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod heuristics;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod utils;

pub use error::{Error, Result};
