use thiserror::Error;

use crate::classify::VulnCategory;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to compile rule `{rule}`: {source}")]
    Rule {
        rule: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to build keyword matcher for {category}: {source}")]
    Keywords {
        category: VulnCategory,
        #[source]
        source: aho_corasick::BuildError,
    },

    #[error("Invalid option: {0}")]
    Config(String),

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Invalid request file: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
