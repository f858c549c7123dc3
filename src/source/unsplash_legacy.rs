//! Query-parameterized Unsplash redirect fetcher.
//!
//! Builds a `source.unsplash.com` URL from configured topic terms once at
//! startup; the server picks a different underlying photo per request, so
//! every fetch goes through the same stateless reupload path.

use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext};
use crate::source::reupload::Reuploader;
use crate::source::traits::{FetchResult, Source};
use anyhow::Context as _;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct UnsplashLegacyConfig {
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    dimensions: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    /// Singular fallback for `topics`.
    #[serde(default)]
    topic: Option<String>,
}

fn default_source() -> String {
    "featured".into()
}

/// Stateless redirect-based source.
pub struct UnsplashLegacySource {
    url: String,
    reupload: Arc<Reuploader>,
}

impl UnsplashLegacySource {
    pub async fn build(ctx: SourceContext, config: serde_json::Value) -> Result<SharedSource> {
        let config: UnsplashLegacyConfig = registry::parse_config("unsplash_legacy", config)?;
        let url = build_url(&config)?;
        Ok(Arc::new(Self {
            url,
            reupload: ctx.reupload,
        }))
    }
}

fn build_url(config: &UnsplashLegacyConfig) -> Result<String> {
    let mut path = format!("https://source.unsplash.com/{}", config.source);
    if let Some(dimensions) = &config.dimensions {
        path.push('/');
        path.push_str(dimensions);
    }
    let mut url = reqwest::Url::parse(&path)
        .with_context(|| format!("invalid unsplash_legacy URL {path}"))?;

    let mut topics = config.topics.clone();
    if topics.is_empty() {
        if let Some(topic) = &config.topic {
            topics.push(topic.clone());
        }
    }
    if !topics.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for topic in &topics {
            pairs.append_pair(topic, "true");
        }
    }
    Ok(url.into())
}

impl Source for UnsplashLegacySource {
    fn name(&self) -> &'static str {
        "unsplash_legacy"
    }

    async fn fetch(&self) -> FetchResult {
        let image = self.reupload.reupload(&self.url, Default::default()).await?;
        Ok(image)
    }
}
