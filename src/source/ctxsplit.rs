//! Context-based routing combinator.
//!
//! Holds an ordered list of partial-context predicates, each guarding one
//! child. The first predicate matching the disruption context wins; calls
//! without a context are a configuration-usage error and cancel.

use crate::config::SourceConfig;
use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext, SourceRegistry};
use crate::source::traits::{DisruptionContext, FetchError, FetchResult, Source, SourceDyn};
use crate::{RoomId, UserId};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ContextSplitConfig {
    sources: Vec<GuardedChildConfig>,
}

#[derive(Debug, Deserialize)]
struct GuardedChildConfig {
    context: PartialDisruptionContext,
    #[serde(flatten)]
    source: SourceConfig,
}

/// A partial context used as a routing predicate.
///
/// The singular filter takes precedence over the set filter for each of
/// room and user; an absent pair of filters matches anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialDisruptionContext {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub room_ids: Option<Vec<RoomId>>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
}

impl PartialDisruptionContext {
    pub fn matches(&self, ctx: &DisruptionContext) -> bool {
        if let Some(room_id) = &self.room_id {
            if ctx.room_id != *room_id {
                return false;
            }
        } else if let Some(room_ids) = &self.room_ids {
            if !room_ids.contains(&ctx.room_id) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if ctx.user_id != *user_id {
                return false;
            }
        } else if let Some(user_ids) = &self.user_ids {
            if !user_ids.contains(&ctx.user_id) {
                return false;
            }
        }
        true
    }
}

struct GuardedChild {
    guard: PartialDisruptionContext,
    source: Arc<dyn SourceDyn>,
}

/// Routing combinator node.
pub struct ContextSplitSource {
    children: Vec<GuardedChild>,
}

impl ContextSplitSource {
    pub async fn build(
        registry: Arc<SourceRegistry>,
        ctx: SourceContext,
        config: serde_json::Value,
    ) -> Result<SharedSource> {
        let config: ContextSplitConfig = registry::parse_config("context_split", config)?;
        let mut children = Vec::with_capacity(config.sources.len());
        for child_config in config.sources {
            let source = registry.build(ctx.clone(), &child_config.source).await?;
            children.push(GuardedChild {
                guard: child_config.context,
                source,
            });
        }
        Ok(Arc::new(Self { children }))
    }
}

impl Source for ContextSplitSource {
    fn name(&self) -> &'static str {
        "context_split"
    }

    async fn fetch(&self) -> FetchResult {
        tracing::error!("called non-context fetch on a context split source");
        Err(FetchError::Cancel)
    }

    async fn fetch_with_context(&self, ctx: Option<DisruptionContext>) -> FetchResult {
        let Some(ctx) = ctx else {
            return Source::fetch(self).await;
        };
        for child in &self.children {
            if child.guard.matches(&ctx) {
                return child.source.fetch().await;
            }
        }
        tracing::debug!(
            room_id = %ctx.room_id,
            user_id = %ctx.user_id,
            "no sources matched context, cancelling disruption"
        );
        Err(FetchError::Cancel)
    }
}
