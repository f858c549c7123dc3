//! Reupload pipeline: fetch a remote picture and re-host it through the
//! transport's media upload.

use crate::source::traits::{Image, ImageInfo};
use crate::transport::TransportDyn;
use anyhow::Context as _;
use futures::future::BoxFuture;
use reqwest::header;
use std::sync::Arc;

/// Optional metadata hints for a reupload.
///
/// Anything left unset is derived from the HTTP response: mime type from the
/// Content-Type header (content sniffing as fallback), title from the
/// Content-Disposition filename or URL path, dimensions from a best-effort
/// decode of the bytes.
#[derive(Debug, Clone, Default)]
pub struct ReuploadHints {
    pub title: Option<String>,
    pub blurhash: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub external_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub thumbnail_dimensions: Option<(u32, u32)>,
    pub headers: Vec<(String, String)>,
}

/// Shared fetch-and-rehost helper used by every leaf source.
pub struct Reuploader {
    http: reqwest::Client,
    transport: Arc<dyn TransportDyn>,
    user_agent: String,
}

impl Reuploader {
    pub fn new(
        http: reqwest::Client,
        transport: Arc<dyn TransportDyn>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            transport,
            user_agent: user_agent.into(),
        }
    }

    /// Retrieve `url`, re-host the bytes, and assemble an [`Image`].
    ///
    /// If the hints name a thumbnail, the whole procedure recurses once for
    /// it and the result is attached to the image's info.
    pub fn reupload<'a>(
        &'a self,
        url: &'a str,
        hints: ReuploadHints,
    ) -> BoxFuture<'a, anyhow::Result<Image>> {
        Box::pin(async move {
            tracing::debug!(title = ?hints.title, %url, "reuploading image");

            let mut request = self
                .http
                .get(url)
                .header(header::USER_AGENT, &self.user_agent);
            for (name, value) in &hints.headers {
                request = request.header(name, value);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("failed to fetch {url}"))?;

            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                .filter(|v| !v.is_empty());
            let disposition = response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let data = response
                .bytes()
                .await
                .with_context(|| format!("failed to read body of {url}"))?;

            let mimetype = content_type.unwrap_or_else(|| sniff_mime(&data));
            let title = match hints.title {
                Some(title) => title,
                None => derive_filename(&final_url, disposition.as_deref(), &mimetype),
            };

            // Dimension decoding is best-effort; unsupported formats just
            // leave width/height unset.
            let (width, height) = match hints.dimensions {
                Some((w, h)) => (Some(w), Some(h)),
                None => match decode_dimensions(&data) {
                    Some((w, h)) => (Some(w), Some(h)),
                    None => (None, None),
                },
            };

            let size = data.len();
            let uri = self
                .transport
                .upload(data.to_vec(), &mimetype)
                .await
                .map_err(anyhow::Error::from)
                .context("media upload failed")?;

            let thumbnail = match &hints.thumbnail_url {
                Some(thumbnail_url) => {
                    let thumb = self
                        .reupload(
                            thumbnail_url,
                            ReuploadHints {
                                title: Some(title.clone()),
                                dimensions: hints.thumbnail_dimensions,
                                headers: hints.headers.clone(),
                                ..Default::default()
                            },
                        )
                        .await
                        .context("thumbnail reupload failed")?;
                    Some(Box::new(thumb))
                }
                None => None,
            };

            Ok(Image {
                title,
                url: uri,
                info: ImageInfo {
                    mimetype,
                    size,
                    width,
                    height,
                    thumbnail,
                    blurhash: hints.blurhash,
                },
                external_url: hints.external_url,
            })
        })
    }
}

/// Sniff a mime type from raw bytes. Only image formats are recognized;
/// anything else is reported as an octet stream.
fn sniff_mime(data: &[u8]) -> String {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type().to_string(),
        Err(_) => "application/octet-stream".into(),
    }
}

/// Best-effort width/height without a full decode.
fn decode_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Derive a display filename: Content-Disposition first, then the last URL
/// path segment, appending a guessed extension when the name has none.
fn derive_filename(url: &reqwest::Url, disposition: Option<&str>, mimetype: &str) -> String {
    let mut filename = disposition
        .and_then(disposition_filename)
        .unwrap_or_default();
    if filename.is_empty() {
        filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
    }
    if !filename.contains('.') {
        if let Some(extension) = extension_for_mime(mimetype) {
            filename.push('.');
            filename.push_str(extension);
        }
    }
    filename
}

fn disposition_filename(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("filename") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn extension_for_mime(mimetype: &str) -> Option<&'static str> {
    image::ImageFormat::from_mime_type(mimetype)
        .and_then(|format| format.extensions_str().first().copied())
}
