use std::convert::Infallible;
use std::fmt;

use thiserror::Error;

/// Which pluggable strategy failed during a chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NextLocator,
    Artifact,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextLocator => f.write_str("next locator"),
            Self::Artifact => f.write_str("artifact"),
        }
    }
}

/// Errors reported as the outcome of a walk.
///
/// Every error is terminal for the chain that raised it. A concurrent walk
/// reports the first one and nothing else.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Invalid walker configuration, detected before any chain work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The fetcher couldn't retrieve a locator.
    #[error("couldn't fetch {locator} got: {source}")]
    Transport {
        locator: String,
        #[source]
        source: anyhow::Error,
    },

    /// One of the extraction strategies failed on a fetched page.
    #[error("{stage} extraction failed for {locator} got: {source}")]
    Extraction {
        stage: Stage,
        locator: String,
        #[source]
        source: anyhow::Error,
    },

    /// The sink refused to store an artifact.
    #[error("couldn't persist artifact {name} got: {source}")]
    Persistence {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every chain stopped without reporting an outcome (a step panicked or
    /// the runtime shut down).
    #[error("walk aborted before reporting an outcome")]
    Aborted,
}

impl CrawlError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport { .. } => "transport",
            Self::Extraction {
                stage: Stage::NextLocator,
                ..
            } => "extraction_next_locator",
            Self::Extraction {
                stage: Stage::Artifact,
                ..
            } => "extraction_artifact",
            Self::Persistence { .. } => "persistence",
            Self::Aborted => "aborted",
        }
    }
}

impl From<Infallible> for CrawlError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
