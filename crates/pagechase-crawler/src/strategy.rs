use async_trait::async_trait;

/// A fetched document along with the locator it was actually served from.
#[derive(Debug, Clone)]
pub struct Page {
    /// Canonical locator, after redirects.
    pub locator: String,
    pub body: String,
}

/// Content a chain step decided to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Falls back to the step's item index when missing or empty.
    pub name: Option<String>,
    pub payload: Vec<u8>,
}

impl Artifact {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: None,
            payload: payload.into(),
        }
    }

    pub fn named(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: Some(name.into()),
            payload: payload.into(),
        }
    }

    pub(crate) fn file_name(&self, index: u64) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => index.to_string(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> anyhow::Result<Page>;
}

#[async_trait]
pub trait NextLocatorStrategy: Send + Sync {
    async fn next_locator(&self, page: &Page) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait ArtifactStrategy: Send + Sync {
    async fn artifact(&self, page: &Page) -> anyhow::Result<Option<Artifact>>;
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn store(&self, name: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// Ends every chain after its first step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNextLocator;

#[async_trait]
impl NextLocatorStrategy for NoNextLocator {
    async fn next_locator(&self, _page: &Page) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Never persists anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArtifact;

#[async_trait]
impl ArtifactStrategy for NoArtifact {
    async fn artifact(&self, _page: &Page) -> anyhow::Result<Option<Artifact>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_falls_back_to_index() {
        assert_eq!(Artifact::new("x").file_name(7), "7");
        assert_eq!(Artifact::named("", "x").file_name(3), "3");
        assert_eq!(Artifact::named("page.html", "x").file_name(3), "page.html");
    }

    #[tokio::test]
    async fn defaults_produce_nothing() {
        let page = Page {
            locator: "http://localhost:8080".into(),
            body: String::new(),
        };
        assert_eq!(NoNextLocator.next_locator(&page).await.unwrap(), None);
        assert_eq!(NoArtifact.artifact(&page).await.unwrap(), None);
    }
}
