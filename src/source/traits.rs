//! Source trait, dynamic dispatch companion, and the image data model.

use crate::{ContentUri, RoomId, UserId};
use std::pin::Pin;

/// A fetched, re-hosted picture ready to be posted.
#[derive(Debug, Clone)]
pub struct Image {
    pub title: String,
    pub url: ContentUri,
    pub info: ImageInfo,
    pub external_url: Option<String>,
}

/// Metadata attached to a fetched image.
#[derive(Debug, Clone, Default)]
pub struct ImageInfo {
    pub mimetype: String,
    pub size: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail: Option<Box<Image>>,
    pub blurhash: Option<String>,
}

/// The room and user a disruption is aimed at.
///
/// Passed through `fetch_with_context` so routing combinators can pick a
/// child; plain fetches carry no context.
#[derive(Debug, Clone)]
pub struct DisruptionContext {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// Failure modes of a fetch.
///
/// `Cancel` is control flow, not a fault: the source has nothing to offer
/// right now and the disruption should be skipped quietly. Everything else
/// is an unexpected error that gets logged but never crashes the bot.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("disruption cancelled: no content available")]
    Cancel,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        FetchError::Other(error.into())
    }
}

pub type FetchResult = std::result::Result<Image, FetchError>;

/// Static trait for source nodes.
/// Use this for type-safe implementations.
pub trait Source: Send + Sync + 'static {
    /// Registered type name of this node.
    fn name(&self) -> &'static str;

    /// Fetch one image, or cancel if nothing is available.
    fn fetch(&self) -> impl std::future::Future<Output = FetchResult> + Send;

    /// Fetch with an optional disruption context.
    /// Non-routing sources ignore the context and delegate to `fetch`.
    fn fetch_with_context(
        &self,
        ctx: Option<DisruptionContext>,
    ) -> impl std::future::Future<Output = FetchResult> + Send {
        let _ = ctx;
        self.fetch()
    }
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn SourceDyn>` for storing heterogeneous
/// tree nodes.
pub trait SourceDyn: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn fetch<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = FetchResult> + Send + 'a>>;

    fn fetch_with_context<'a>(
        &'a self,
        ctx: Option<DisruptionContext>,
    ) -> Pin<Box<dyn std::future::Future<Output = FetchResult> + Send + 'a>>;
}

/// Blanket implementation: any type implementing Source automatically
/// implements SourceDyn.
impl<T: Source> SourceDyn for T {
    fn name(&self) -> &'static str {
        Source::name(self)
    }

    fn fetch<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = FetchResult> + Send + 'a>> {
        Box::pin(Source::fetch(self))
    }

    fn fetch_with_context<'a>(
        &'a self,
        ctx: Option<DisruptionContext>,
    ) -> Pin<Box<dyn std::future::Future<Output = FetchResult> + Send + 'a>> {
        Box::pin(Source::fetch_with_context(self, ctx))
    }
}
