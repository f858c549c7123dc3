//! Static URL leaf source.

use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext};
use crate::source::reupload::Reuploader;
use crate::source::traits::{FetchResult, Source};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct UrlConfig {
    url: String,
}

/// Stateless source that reuploads the same fixed locator on every fetch.
pub struct UrlSource {
    url: String,
    reupload: Arc<Reuploader>,
}

impl UrlSource {
    pub async fn build(ctx: SourceContext, config: serde_json::Value) -> Result<SharedSource> {
        let config: UrlConfig = registry::parse_config("url", config)?;
        Ok(Arc::new(Self {
            url: config.url,
            reupload: ctx.reupload,
        }))
    }
}

impl Source for UrlSource {
    fn name(&self) -> &'static str {
        "url"
    }

    async fn fetch(&self) -> FetchResult {
        let image = self.reupload.reupload(&self.url, Default::default()).await?;
        Ok(image)
    }
}
