use std::path::{Component, Path, PathBuf};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::strategy::Sink;

/// Stores every artifact as a file named after it, under one directory.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sink for FsSink {
    async fn store(&self, name: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => (),
            _ => return Err(anyhow!("Invalid artifact name: {name:?}")),
        }
        fs_err::tokio::write(self.root.join(name), payload).await?;
        Ok(())
    }
}
