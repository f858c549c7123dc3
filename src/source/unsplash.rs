//! Unsplash API client with a bounded backlog.
//!
//! Fetches random photos in batches and keeps the reuploaded results in a
//! bounded deque. Refills are fire-and-forget, collapsed by a lock, and
//! honor a provider-side backoff: when the remaining-quota header drops
//! below a floor, no refill runs for an hour.

use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext};
use crate::source::reupload::{ReuploadHints, Reuploader};
use crate::source::traits::{FetchError, FetchResult, Image, Source};
use crate::tasks::BackgroundTasks;
use crate::unix_now;
use reqwest::header;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

const RANDOM_PHOTO_URL: &str = "https://api.unsplash.com/photos/random";
const QUOTA_BACKOFF_SECS: f64 = 3600.0;

#[derive(Debug, Deserialize)]
struct UnsplashConfig {
    access_key: String,
    #[serde(default)]
    query: Option<String>,
    /// Backlog level that triggers a refill.
    #[serde(default = "default_min_backlog")]
    min_backlog: usize,
    /// Photos requested per refill.
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    /// Remaining-quota level that starts the hour-long backoff.
    #[serde(default = "default_quota_floor")]
    quota_floor: u64,
}

fn default_min_backlog() -> usize {
    5
}

fn default_batch_size() -> usize {
    30
}

fn default_quota_floor() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    blur_hash: Option<String>,
    urls: UnsplashUrls,
    #[serde(default)]
    links: UnsplashLinks,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    regular: String,
    #[serde(default)]
    thumb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UnsplashLinks {
    #[serde(default)]
    html: Option<String>,
}

impl UnsplashPhoto {
    fn title(&self) -> Option<String> {
        self.description
            .clone()
            .or_else(|| self.alt_description.clone())
    }
}

struct UnsplashState {
    backlog: VecDeque<Image>,
    /// Unix time before which refills are skipped.
    next_refill_allowed: f64,
}

struct UnsplashInner {
    access_key: String,
    query: Option<String>,
    min_backlog: usize,
    batch_size: usize,
    quota_floor: u64,
    /// min_backlog + batch_size.
    capacity: usize,
    http: reqwest::Client,
    reupload: Arc<Reuploader>,
    tasks: BackgroundTasks,
    state: Mutex<UnsplashState>,
    refill_lock: Mutex<()>,
}

/// Bounded random-photo API source.
pub struct UnsplashSource {
    inner: Arc<UnsplashInner>,
}

impl UnsplashSource {
    pub async fn build(ctx: SourceContext, config: serde_json::Value) -> Result<SharedSource> {
        let config: UnsplashConfig = registry::parse_config("unsplash", config)?;
        let capacity = config.min_backlog + config.batch_size;
        let inner = Arc::new(UnsplashInner {
            access_key: config.access_key,
            query: config.query,
            min_backlog: config.min_backlog,
            batch_size: config.batch_size,
            quota_floor: config.quota_floor,
            capacity,
            http: ctx.http,
            reupload: ctx.reupload,
            tasks: ctx.tasks,
            state: Mutex::new(UnsplashState {
                backlog: VecDeque::with_capacity(capacity),
                next_refill_allowed: 0.0,
            }),
            refill_lock: Mutex::new(()),
        });
        Ok(Arc::new(Self { inner }))
    }
}

impl UnsplashInner {
    /// Fetch one batch and push the reuploaded photos into the backlog.
    /// No-ops if a concurrent refill already recovered the backlog or the
    /// quota backoff is active.
    async fn refill(self: Arc<Self>) {
        let _guard = self.refill_lock.lock().await;
        {
            let state = self.state.lock().await;
            if state.backlog.len() >= self.min_backlog {
                return;
            }
            if unix_now() < state.next_refill_allowed {
                tracing::debug!("provider quota backoff active, skipping refill");
                return;
            }
        }

        let mut request = self
            .http
            .get(RANDOM_PHOTO_URL)
            .header(
                header::AUTHORIZATION,
                format!("Client-ID {}", self.access_key),
            )
            .query(&[("count", self.batch_size.to_string())]);
        if let Some(query) = &self.query {
            request = request.query(&[("query", query)]);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%error, "random photo request failed");
                return;
            }
        };

        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(remaining) = remaining {
            if remaining < self.quota_floor {
                let mut state = self.state.lock().await;
                state.next_refill_allowed = unix_now() + QUOTA_BACKOFF_SECS;
                tracing::warn!(remaining, "provider quota low, backing off for an hour");
            }
        }

        let status = response.status();
        let photos = match response.json::<Vec<UnsplashPhoto>>().await {
            Ok(photos) => photos,
            Err(error) => {
                tracing::error!(%status, %error, "got non-JSON random photo response");
                return;
            }
        };

        let mut added = 0;
        for photo in photos {
            let hints = ReuploadHints {
                title: photo.title(),
                blurhash: photo.blur_hash.clone(),
                dimensions: photo.width.zip(photo.height),
                external_url: photo.links.html.clone(),
                thumbnail_url: photo.urls.thumb.clone(),
                ..Default::default()
            };
            match self.reupload.reupload(&photo.urls.regular, hints).await {
                Ok(image) => {
                    let mut state = self.state.lock().await;
                    if state.backlog.len() >= self.capacity {
                        break;
                    }
                    state.backlog.push_back(image);
                    added += 1;
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to reupload random photo");
                }
            }
        }
        tracing::info!(added, "random photos cached");
    }
}

impl Source for UnsplashSource {
    fn name(&self) -> &'static str {
        "unsplash"
    }

    async fn fetch(&self) -> FetchResult {
        let inner = &self.inner;
        let (needs_refill, image) = {
            let mut state = inner.state.lock().await;
            let needs_refill = state.backlog.len() < inner.min_backlog;
            (needs_refill, state.backlog.pop_front())
        };

        if needs_refill {
            let refill_inner = inner.clone();
            inner.tasks.spawn(refill_inner.refill());
        }

        match image {
            Some(image) => Ok(image),
            None => {
                tracing::warn!("backlog is empty, cancelling disruption");
                Err(FetchError::Cancel)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::traits::ImageInfo;
    use crate::testutil::MockTransport;
    use crate::transport::TransportDyn;

    fn stub_image(title: &str) -> Image {
        Image {
            title: title.into(),
            url: Arc::from("media://stub"),
            info: ImageInfo::default(),
            external_url: None,
        }
    }

    fn inner_with(backlog: Vec<Image>, next_refill_allowed: f64) -> Arc<UnsplashInner> {
        let transport: Arc<dyn TransportDyn> = Arc::new(MockTransport::new());
        let http = reqwest::Client::new();
        Arc::new(UnsplashInner {
            access_key: "test-key".into(),
            query: None,
            min_backlog: 2,
            batch_size: 3,
            quota_floor: 10,
            capacity: 5,
            reupload: Arc::new(Reuploader::new(http.clone(), transport, "disruptor-test")),
            http,
            tasks: BackgroundTasks::new(),
            state: Mutex::new(UnsplashState {
                backlog: backlog.into(),
                next_refill_allowed,
            }),
            refill_lock: Mutex::new(()),
        })
    }

    #[tokio::test]
    async fn refill_honors_quota_backoff() {
        let backoff_until = unix_now() + QUOTA_BACKOFF_SECS;
        let inner = inner_with(Vec::new(), backoff_until);

        inner.clone().refill().await;

        let state = inner.state.lock().await;
        assert!(state.backlog.is_empty());
        assert_eq!(state.next_refill_allowed, backoff_until);
    }

    #[tokio::test]
    async fn refill_noops_when_backlog_already_recovered() {
        // Backlog at min_backlog: a concurrent refill got there first.
        let inner = inner_with(vec![stub_image("a"), stub_image("b")], 0.0);

        inner.clone().refill().await;

        let state = inner.state.lock().await;
        assert_eq!(state.backlog.len(), 2);
        assert_eq!(state.backlog[0].title, "a");
    }

    #[test]
    fn parses_random_photo_batch() {
        let json = indoc::indoc! {r#"
            [
              {
                "id": "p1",
                "description": null,
                "alt_description": "a cat on a sofa",
                "width": 4000,
                "height": 3000,
                "blur_hash": "LEHV6nWB2yk8",
                "urls": {
                  "regular": "https://images.unsplash.com/p1?w=1080",
                  "thumb": "https://images.unsplash.com/p1?w=200"
                },
                "links": {"html": "https://unsplash.com/photos/p1"}
              }
            ]
        "#};

        let photos: Vec<UnsplashPhoto> = serde_json::from_str(json).unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].title().as_deref(), Some("a cat on a sofa"));
        assert_eq!(photos[0].width.zip(photos[0].height), Some((4000, 3000)));
        assert_eq!(
            photos[0].urls.thumb.as_deref(),
            Some("https://images.unsplash.com/p1?w=200")
        );
    }

    #[test]
    fn minimal_photo_payload_is_accepted() {
        let json = r#"[{"urls": {"regular": "https://images.unsplash.com/p2"}}]"#;
        let photos: Vec<UnsplashPhoto> = serde_json::from_str(json).unwrap();
        assert!(photos[0].title().is_none());
        assert!(photos[0].links.html.is_none());
    }
}
