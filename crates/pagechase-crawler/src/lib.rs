mod config;
mod error;
mod fetch;
mod gate;
mod sink;
mod strategy;
mod walker;

pub use config::{AdmissionBackoff, Ceiling, CrawlerConfig, Mode};
pub use error::{CrawlError, Stage};
pub use fetch::HttpFetcher;
pub use gate::{AdmissionGate, AdmissionRequest, GateState};
pub use sink::FsSink;
pub use strategy::{
    Artifact, ArtifactStrategy, Fetcher, NextLocatorStrategy, NoArtifact, NoNextLocator, Page,
    Sink,
};
pub use walker::{default_on_done, Walker};

pub use anyhow;
pub use async_trait::async_trait;
