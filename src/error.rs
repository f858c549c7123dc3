//! Crate-wide error type.

/// Errors that can abort startup or surface from the transport layer.
///
/// Steady-state fetch failures never use this type; they are reported as
/// [`crate::source::FetchError`] and degrade into skipped disruptions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source config named a type that is not in the registry.
    #[error("unknown source type '{0}'")]
    UnknownSourceType(String),

    /// A source config was present but did not match the source's schema.
    #[error("invalid config for '{kind}' source: {source}")]
    SourceConfig {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
