//! Subreddit listing scraper.
//!
//! Keeps a LIFO backlog of image posts and a process-lifetime set of already
//! handled post ids. An empty backlog triggers a reload inline with the
//! fetch; dropping below the low-water mark schedules one in the background,
//! collapsed by a reentrancy lock.

use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext};
use crate::source::reupload::{ReuploadHints, Reuploader};
use crate::source::traits::{FetchError, FetchResult, Source};
use crate::tasks::BackgroundTasks;
use reqwest::header;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Schedule a background reload once the backlog shrinks below this.
const LOW_WATER_MARK: usize = 5;

#[derive(Debug, Deserialize)]
struct RedditConfig {
    subreddit: String,
    #[serde(default)]
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    title: String,
    url: String,
    permalink: String,
    #[serde(default)]
    post_hint: String,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnail_width: Option<u32>,
    #[serde(default)]
    thumbnail_height: Option<u32>,
}

/// A listing entry waiting to be reuploaded.
#[derive(Debug, Clone)]
struct PendingPost {
    url: String,
    title: String,
    external_url: String,
    thumbnail_url: Option<String>,
    thumbnail_dimensions: Option<(u32, u32)>,
}

struct RedditState {
    backlog: Vec<PendingPost>,
    // No eviction: grows for the process lifetime.
    handled_ids: HashSet<String>,
}

struct RedditInner {
    subreddit: String,
    user_agent: String,
    http: reqwest::Client,
    reupload: Arc<Reuploader>,
    tasks: BackgroundTasks,
    state: Mutex<RedditState>,
    reload_lock: Mutex<()>,
}

/// Listing scraper source.
pub struct RedditSource {
    inner: Arc<RedditInner>,
}

impl RedditSource {
    pub async fn build(ctx: SourceContext, config: serde_json::Value) -> Result<SharedSource> {
        let config: RedditConfig = registry::parse_config("reddit", config)?;
        let inner = Arc::new(RedditInner {
            subreddit: config.subreddit,
            user_agent: config.user_agent.unwrap_or(ctx.user_agent),
            http: ctx.http,
            reupload: ctx.reupload,
            tasks: ctx.tasks,
            state: Mutex::new(RedditState {
                backlog: Vec::new(),
                handled_ids: HashSet::new(),
            }),
            reload_lock: Mutex::new(()),
        });
        Ok(Arc::new(Self { inner }))
    }
}

impl RedditInner {
    /// Reload unless a concurrent reload already refilled the backlog.
    async fn reload(&self) {
        let _guard = self.reload_lock.lock().await;
        if self.state.lock().await.backlog.len() < LOW_WATER_MARK {
            self.load_listing().await;
        }
    }

    async fn load_listing(&self) {
        tracing::debug!(subreddit = %self.subreddit, "caching listing data");
        let posts = self.fetch_posts().await;
        let mut state = self.state.lock().await;
        let mut cached = 0;
        for post in posts {
            if let Some(pending) = collect_post(post, &mut state.handled_ids) {
                state.backlog.push(pending);
                cached += 1;
            }
        }
        tracing::info!(subreddit = %self.subreddit, cached, "posts cached from listing");
    }

    /// One listing request. Malformed or unreachable responses count as
    /// zero results, never as an error.
    async fn fetch_posts(&self) -> Vec<PostData> {
        let url = format!("https://www.reddit.com/r/{}/.json?raw_json=1", self.subreddit);
        let response = match self
            .http
            .get(&url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%error, subreddit = %self.subreddit, "listing request failed");
                return Vec::new();
            }
        };
        let status = response.status();
        match response.json::<Listing>().await {
            Ok(listing) => listing
                .data
                .children
                .into_iter()
                .map(|child| child.data)
                .collect(),
            Err(error) => {
                tracing::error!(
                    %status,
                    %error,
                    "got non-JSON response data while trying to find pictures"
                );
                Vec::new()
            }
        }
    }
}

/// Filter one post and mark its id as handled. Only unseen, safe-for-work
/// image posts make it into the backlog.
fn collect_post(post: PostData, handled_ids: &mut HashSet<String>) -> Option<PendingPost> {
    if post.post_hint != "image" || post.over_18 {
        return None;
    }
    if !handled_ids.insert(post.id) {
        return None;
    }
    let thumbnail_dimensions = post.thumbnail_width.zip(post.thumbnail_height);
    Some(PendingPost {
        url: post.url,
        title: post.title,
        external_url: format!("https://www.reddit.com{}", post.permalink),
        thumbnail_url: post.thumbnail,
        thumbnail_dimensions,
    })
}

impl Source for RedditSource {
    fn name(&self) -> &'static str {
        "reddit"
    }

    async fn fetch(&self) -> FetchResult {
        let inner = &self.inner;
        if inner.state.lock().await.backlog.is_empty() {
            tracing::warn!(subreddit = %inner.subreddit, "backlog is empty, awaiting reload");
            inner.reload().await;
        }

        let (post, remaining) = {
            let mut state = inner.state.lock().await;
            let post = state.backlog.pop();
            (post, state.backlog.len())
        };
        let Some(post) = post else {
            tracing::error!(
                subreddit = %inner.subreddit,
                "backlog is still empty after reload, cancelling disruption"
            );
            return Err(FetchError::Cancel);
        };

        if remaining < LOW_WATER_MARK {
            let reload_inner = inner.clone();
            inner.tasks.spawn(async move {
                reload_inner.reload().await;
            });
        }

        let image = inner
            .reupload
            .reupload(
                &post.url,
                ReuploadHints {
                    title: Some(post.title),
                    external_url: Some(post.external_url),
                    thumbnail_url: post.thumbnail_url,
                    thumbnail_dimensions: post.thumbnail_dimensions,
                    ..Default::default()
                },
            )
            .await?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use crate::transport::TransportDyn;

    fn pending(title: &str) -> PendingPost {
        PendingPost {
            url: "https://i.redd.it/x.jpg".into(),
            title: title.into(),
            external_url: "https://www.reddit.com/r/cats/comments/x/".into(),
            thumbnail_url: None,
            thumbnail_dimensions: None,
        }
    }

    fn inner_with(backlog: Vec<PendingPost>) -> Arc<RedditInner> {
        let transport: Arc<dyn TransportDyn> = Arc::new(MockTransport::new());
        let http = reqwest::Client::new();
        Arc::new(RedditInner {
            subreddit: "cats".into(),
            user_agent: "disruptor-test".into(),
            reupload: Arc::new(Reuploader::new(http.clone(), transport, "disruptor-test")),
            http,
            tasks: BackgroundTasks::new(),
            state: Mutex::new(RedditState {
                backlog,
                handled_ids: HashSet::new(),
            }),
            reload_lock: Mutex::new(()),
        })
    }

    #[tokio::test]
    async fn reload_noops_at_low_water_mark() {
        // Backlog already recovered: a concurrent reload beat this one.
        let backlog: Vec<_> = (0..LOW_WATER_MARK)
            .map(|i| pending(&format!("post-{i}")))
            .collect();
        let inner = inner_with(backlog);

        inner.reload().await;

        let state = inner.state.lock().await;
        assert_eq!(state.backlog.len(), LOW_WATER_MARK);
        assert!(state.handled_ids.is_empty());
    }

    fn parse_posts(json: &str) -> Vec<PostData> {
        let listing: Listing = serde_json::from_str(json).unwrap();
        listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .collect()
    }

    const LISTING: &str = indoc::indoc! {r#"
        {
          "data": {
            "children": [
              {
                "data": {
                  "id": "a1",
                  "title": "sleepy cat",
                  "url": "https://i.redd.it/a1.jpg",
                  "permalink": "/r/cats/comments/a1/",
                  "post_hint": "image",
                  "over_18": false,
                  "thumbnail": "https://b.thumbs.redditmedia.com/a1.jpg",
                  "thumbnail_width": 140,
                  "thumbnail_height": 105
                }
              },
              {
                "data": {
                  "id": "a2",
                  "title": "link post",
                  "url": "https://example.com",
                  "permalink": "/r/cats/comments/a2/",
                  "post_hint": "link"
                }
              },
              {
                "data": {
                  "id": "a3",
                  "title": "nsfw cat",
                  "url": "https://i.redd.it/a3.jpg",
                  "permalink": "/r/cats/comments/a3/",
                  "post_hint": "image",
                  "over_18": true
                }
              }
            ]
          }
        }
    "#};

    #[test]
    fn filters_non_image_and_adult_posts() {
        let mut handled = HashSet::new();
        let pending: Vec<_> = parse_posts(LISTING)
            .into_iter()
            .filter_map(|post| collect_post(post, &mut handled))
            .collect();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "sleepy cat");
        assert_eq!(
            pending[0].external_url,
            "https://www.reddit.com/r/cats/comments/a1/"
        );
        assert_eq!(pending[0].thumbnail_dimensions, Some((140, 105)));
    }

    #[test]
    fn seen_ids_are_skipped_on_later_reloads() {
        let mut handled = HashSet::new();
        let first: Vec<_> = parse_posts(LISTING)
            .into_iter()
            .filter_map(|post| collect_post(post, &mut handled))
            .collect();
        assert_eq!(first.len(), 1);

        let second: Vec<_> = parse_posts(LISTING)
            .into_iter()
            .filter_map(|post| collect_post(post, &mut handled))
            .collect();
        assert!(second.is_empty());
    }

    #[test]
    fn malformed_listing_is_zero_results() {
        assert!(serde_json::from_str::<Listing>("<html>rate limited</html>").is_err());
    }
}
