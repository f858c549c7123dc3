//! Type-name registry driving source tree construction.
//!
//! The registry maps config `type` names to builder functions and is
//! populated once at startup. Combinator builders call back into the
//! registry to construct their children, so an unregistered type anywhere
//! in the tree fails the whole startup.

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::source::reupload::Reuploader;
use crate::source::traits::SourceDyn;
use crate::tasks::BackgroundTasks;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// A built source tree node.
pub type SharedSource = Arc<dyn SourceDyn>;

type BuilderFuture = BoxFuture<'static, Result<SharedSource>>;
type Builder = fn(Arc<SourceRegistry>, SourceContext, serde_json::Value) -> BuilderFuture;

/// Shared dependencies handed to every source builder.
#[derive(Clone)]
pub struct SourceContext {
    pub http: reqwest::Client,
    pub reupload: Arc<Reuploader>,
    pub user_agent: String,
    pub tasks: BackgroundTasks,
}

/// Flat map from type name to builder.
pub struct SourceRegistry {
    builders: HashMap<&'static str, Builder>,
}

impl SourceRegistry {
    /// Registry with every built-in source type.
    pub fn standard() -> Arc<Self> {
        let mut builders: HashMap<&'static str, Builder> = HashMap::new();
        builders.insert("url", |_, ctx, cfg| {
            Box::pin(crate::source::url::UrlSource::build(ctx, cfg))
        });
        builders.insert("reddit", |_, ctx, cfg| {
            Box::pin(crate::source::reddit::RedditSource::build(ctx, cfg))
        });
        builders.insert("unsplash", |_, ctx, cfg| {
            Box::pin(crate::source::unsplash::UnsplashSource::build(ctx, cfg))
        });
        builders.insert("unsplash_legacy", |_, ctx, cfg| {
            Box::pin(crate::source::unsplash_legacy::UnsplashLegacySource::build(ctx, cfg))
        });
        builders.insert("cache", |registry, ctx, cfg| {
            Box::pin(crate::source::cache::CacheSource::build(registry, ctx, cfg))
        });
        builders.insert("random", |registry, ctx, cfg| {
            Box::pin(crate::source::random::RandomSource::build(registry, ctx, cfg))
        });
        builders.insert("context_split", |registry, ctx, cfg| {
            Box::pin(crate::source::ctxsplit::ContextSplitSource::build(registry, ctx, cfg))
        });
        Arc::new(Self { builders })
    }

    /// Build the (sub)tree described by `config`.
    pub fn build(self: &Arc<Self>, ctx: SourceContext, config: &SourceConfig) -> BuilderFuture {
        let Some(builder) = self.builders.get(config.kind.as_str()) else {
            let kind = config.kind.clone();
            return Box::pin(async move { Err(Error::UnknownSourceType(kind)) });
        };
        builder(self.clone(), ctx, config.config.clone())
    }
}

/// Deserialize one source's own config section, reporting schema mismatches
/// as fatal startup errors.
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    value: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(value).map_err(|source| Error::SourceConfig { kind, source })
}
