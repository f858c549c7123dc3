//! Pluggable content sources: leaf fetchers and combinators.

pub mod cache;
pub mod ctxsplit;
pub mod random;
pub mod reddit;
pub mod registry;
pub mod reupload;
pub mod traits;
pub mod unsplash;
pub mod unsplash_legacy;
pub mod url;

pub use registry::{SharedSource, SourceContext, SourceRegistry};
pub use reupload::{ReuploadHints, Reuploader};
pub use traits::{DisruptionContext, FetchError, FetchResult, Image, ImageInfo, Source, SourceDyn};
