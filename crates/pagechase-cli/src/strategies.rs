use pagechase_crawler::{
    anyhow, async_trait, Artifact, ArtifactStrategy, NextLocatorStrategy, Page,
};
use reqwest::Url;
use select::document::Document;
use select::predicate::{Class, Name, Predicate};

use crate::StrategyArgs;

/// Follows the first `<a>` or `<link>` whose `rel` holds a given token.
#[derive(Debug, Clone)]
pub struct RelLink {
    rel: String,
}

impl RelLink {
    pub fn new(rel: impl Into<String>) -> Self {
        Self { rel: rel.into() }
    }

    fn find(&self, page: &Page) -> anyhow::Result<Option<String>> {
        let document = Document::from(page.body.as_str());
        let href = document
            .find(Name("a").or(Name("link")))
            .filter(|node| {
                node.attr("rel")
                    .map(|rel| {
                        rel.split_whitespace()
                            .any(|token| token.eq_ignore_ascii_case(&self.rel))
                    })
                    .unwrap_or(false)
            })
            .find_map(|node| node.attr("href").map(str::to_string));

        match href {
            Some(href) => Ok(Some(Url::parse(&page.locator)?.join(&href)?.to_string())),
            None => Ok(None),
        }
    }
}

impl From<&StrategyArgs> for RelLink {
    fn from(args: &StrategyArgs) -> Self {
        Self::new(&args.next_rel)
    }
}

#[async_trait]
impl NextLocatorStrategy for RelLink {
    async fn next_locator(&self, page: &Page) -> anyhow::Result<Option<String>> {
        self.find(page)
    }
}

/// Persists the page body, or only the elements carrying a class.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    class: Option<String>,
    name_from_url: bool,
}

impl PageContent {
    fn extract(&self, page: &Page) -> anyhow::Result<Option<Artifact>> {
        let payload = match &self.class {
            None => page.body.clone(),
            Some(class) => {
                let document = Document::from(page.body.as_str());
                let parts = document
                    .find(Class(class.as_str()))
                    .map(|node| node.html())
                    .collect::<Vec<_>>();
                if parts.is_empty() {
                    log::debug!("No .{class} element in {}", page.locator);
                    return Ok(None);
                }
                parts.join("\n")
            }
        };

        let name = if self.name_from_url {
            last_segment(&page.locator)?
        } else {
            None
        };

        Ok(Some(Artifact {
            name,
            payload: payload.into_bytes(),
        }))
    }
}

fn last_segment(locator: &str) -> anyhow::Result<Option<String>> {
    let url = Url::parse(locator)?;
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string);
    Ok(segment)
}

impl From<&StrategyArgs> for PageContent {
    fn from(args: &StrategyArgs) -> Self {
        Self {
            class: args.content_class.clone(),
            name_from_url: args.name_from_url,
        }
    }
}

#[async_trait]
impl ArtifactStrategy for PageContent {
    async fn artifact(&self, page: &Page) -> anyhow::Result<Option<Artifact>> {
        self.extract(page)
    }
}
