//! Bounded cache combinator with background refill.
//!
//! Wraps one child source, pre-fills a bounded buffer at build time, and
//! replenishes one entry in the background for every hit. Failed child
//! fetches are counted; each later success schedules one extra fetch per
//! counted failure, so the buffer catches back up once the child recovers.

use crate::config::SourceConfig;
use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext, SourceRegistry};
use crate::source::traits::{FetchError, FetchResult, Image, Source, SourceDyn};
use crate::tasks::BackgroundTasks;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Deserialize)]
struct CacheConfig {
    #[serde(default = "default_size")]
    size: usize,
    /// Seconds to sleep between initial fills, for children with external
    /// rate limits.
    #[serde(default)]
    initial_fetch_sleep: f64,
    #[serde(flatten)]
    child: SourceConfig,
}

fn default_size() -> usize {
    5
}

struct CacheState {
    buffer: VecDeque<Image>,
    fetch_errors: u32,
}

struct CacheInner {
    child: Arc<dyn SourceDyn>,
    capacity: usize,
    state: Mutex<CacheState>,
    tasks: BackgroundTasks,
}

/// Caching combinator node.
pub struct CacheSource {
    inner: Arc<CacheInner>,
}

impl CacheSource {
    pub async fn build(
        registry: Arc<SourceRegistry>,
        ctx: SourceContext,
        config: serde_json::Value,
    ) -> Result<SharedSource> {
        let config: CacheConfig = registry::parse_config("cache", config)?;
        let child = registry.build(ctx.clone(), &config.child).await?;
        let inner = Arc::new(CacheInner {
            child,
            capacity: config.size,
            state: Mutex::new(CacheState {
                buffer: VecDeque::with_capacity(config.size),
                fetch_errors: 0,
            }),
            tasks: ctx.tasks,
        });

        tracing::debug!(capacity = config.size, "fetching images to fill cache");
        for _ in 0..config.size {
            inner.clone().fetch_to_cache().await;
            if config.initial_fetch_sleep > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(config.initial_fetch_sleep)).await;
            }
        }

        Ok(Arc::new(Self { inner }))
    }
}

impl CacheInner {
    /// Fetch one image from the child into the buffer.
    ///
    /// Boxed because a success may spawn another round of itself to cover
    /// an earlier counted failure.
    fn fetch_to_cache(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            match self.child.fetch().await {
                Ok(image) => {
                    let mut state = self.state.lock().await;
                    if state.buffer.len() >= self.capacity {
                        state.buffer.pop_back();
                    }
                    state.buffer.push_front(image);
                    tracing::debug!(size = state.buffer.len(), "got image for cache");
                    if state.fetch_errors > 0 {
                        state.fetch_errors -= 1;
                        drop(state);
                        tracing::debug!(
                            "fetching additional image after successful fetch to cover earlier error"
                        );
                        let tasks = self.tasks.clone();
                        tasks.spawn(async move {
                            self.fetch_to_cache().await;
                        });
                    }
                }
                Err(FetchError::Cancel) => {
                    tracing::warn!("child cancelled fetch to fill cache");
                    self.state.lock().await.fetch_errors += 1;
                }
                Err(FetchError::Other(error)) => {
                    tracing::error!(%error, "child failed to fetch image to fill cache");
                    self.state.lock().await.fetch_errors += 1;
                }
            }
        })
    }
}

impl Source for CacheSource {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self) -> FetchResult {
        let popped = self.inner.state.lock().await.buffer.pop_front();
        let Some(image) = popped else {
            // Exhaustion is never retried synchronously here; the buffer
            // only recovers through background refills.
            tracing::error!("cache is empty, cancelling disruption");
            return Err(FetchError::Cancel);
        };
        tracing::debug!("fetching image to refill cache");
        let refill_inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            refill_inner.fetch_to_cache().await;
        });
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DisruptionContext;
    use crate::testutil::StubSource;

    fn cache_over(child: StubSource, capacity: usize) -> (CacheSource, BackgroundTasks) {
        let tasks = BackgroundTasks::new();
        let inner = Arc::new(CacheInner {
            child: Arc::new(child),
            capacity,
            state: Mutex::new(CacheState {
                buffer: VecDeque::new(),
                fetch_errors: 0,
            }),
            tasks: tasks.clone(),
        });
        (CacheSource { inner }, tasks)
    }

    async fn prefill(cache: &CacheSource) {
        for _ in 0..cache.inner.capacity {
            cache.inner.clone().fetch_to_cache().await;
        }
    }

    #[tokio::test]
    async fn drains_to_cancel_when_child_dries_up() {
        // Five successes, everything after that cancels.
        let child = StubSource::with_results(5, true);
        let (cache, tasks) = cache_over(child, 5);
        prefill(&cache).await;

        for _ in 0..5 {
            assert!(Source::fetch(&cache).await.is_ok());
        }
        tasks.wait_idle().await;
        assert!(matches!(Source::fetch(&cache).await, Err(FetchError::Cancel)));
    }

    #[tokio::test]
    async fn never_returns_more_than_successfully_fetched() {
        // Child cancels every fetch: the buffer stays empty.
        let child = StubSource::with_results(0, true);
        let (cache, tasks) = cache_over(child, 3);
        prefill(&cache).await;
        tasks.wait_idle().await;

        assert!(matches!(Source::fetch(&cache).await, Err(FetchError::Cancel)));
        assert_eq!(cache.inner.state.lock().await.fetch_errors, 3);
    }

    #[tokio::test]
    async fn catch_up_refills_cover_earlier_errors() {
        // Two failures, then endless successes.
        let child = StubSource::failing_then_ok(2);
        let (cache, tasks) = cache_over(child, 5);
        prefill(&cache).await;
        tasks.wait_idle().await;

        let state = cache.inner.state.lock().await;
        assert_eq!(state.buffer.len(), 5);
        assert_eq!(state.fetch_errors, 0);
    }

    #[tokio::test]
    async fn context_is_ignored_and_delegated_to_fetch() {
        let child = StubSource::with_results(1, true);
        let (cache, _tasks) = cache_over(child, 1);
        prefill(&cache).await;

        let ctx = DisruptionContext {
            room_id: Arc::from("!room:example.org"),
            user_id: Arc::from("@user:example.org"),
        };
        assert!(Source::fetch_with_context(&cache, Some(ctx)).await.is_ok());
    }
}
