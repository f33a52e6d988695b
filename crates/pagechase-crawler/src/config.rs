use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_mode")]
    pub mode: Mode,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: Ceiling,

    #[serde(default)]
    pub admission: AdmissionBackoff,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            mode: default_mode(),
            max_concurrent: default_max_concurrent(),
            admission: AdmissionBackoff::default(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_user_agent() -> String {
    String::from("pagechaseBot")
}

fn default_mode() -> Mode {
    Mode::Concurrent
}

fn default_max_concurrent() -> Ceiling {
    Ceiling(NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ArgEnum))]
pub enum Mode {
    /// One chain at a time, artifact persisted before the next fetch
    Sequential,
    /// Up to `maxConcurrent` chain steps at once
    Concurrent,
}

/// Maximum number of chain steps allowed to run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Ceiling(NonZeroUsize);

impl Ceiling {
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for Ceiling {
    type Error = CrawlError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        NonZeroUsize::new(n)
            .map(Self)
            .ok_or_else(|| CrawlError::Config("maxConcurrent must be a positive number".into()))
    }
}

impl FromStr for Ceiling {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = s
            .trim()
            .parse::<usize>()
            .map_err(|_| not_a_number())?;
        Self::try_from(n)
    }
}

/// Text given where a count is expected is always refused, even when it
/// reads as a number. Command line and configuration files go through
/// `FromStr` and serde instead.
impl TryFrom<&str> for Ceiling {
    type Error = CrawlError;

    fn try_from(_: &str) -> Result<Self, Self::Error> {
        Err(not_a_number())
    }
}

fn not_a_number() -> CrawlError {
    CrawlError::Config("maxConcurrent must be a number".into())
}

impl From<Ceiling> for usize {
    fn from(c: Ceiling) -> Self {
        c.get()
    }
}

/// Delay between two admission attempts of the same request.
///
/// The first retry waits `firstMs`, every later denial doubles the previous
/// delay, never exceeding `maxMs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionBackoff {
    #[serde(default = "default_first_ms")]
    pub first_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for AdmissionBackoff {
    fn default() -> Self {
        Self {
            first_ms: default_first_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_first_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    30_000
}

impl AdmissionBackoff {
    /// Delay to wait after the `denials`-th denial (1-based).
    pub fn delay(&self, denials: u32) -> Duration {
        let factor = 1u64
            .checked_shl(denials.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self.first_ms.saturating_mul(factor).min(self.max_ms);
        Duration::from_millis(ms)
    }
}
