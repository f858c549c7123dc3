//! Webhook transport for programmatic access.
//!
//! Exposes an HTTP server that accepts inbound room events via POST and
//! delivers outbound messages through a per-room polling endpoint. Uploaded
//! media is kept in memory and served back under `/media/{id}`. This is the
//! integration point for scripts and tests that need to drive the bot
//! without a real chat platform.

use crate::source::Image;
use crate::transport::{InboundStream, Transport};
use crate::{ContentUri, InboundEvent, RoomId};

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// Webhook transport state.
pub struct WebhookTransport {
    bind: String,
    port: u16,
    inbound_tx: Arc<RwLock<Option<mpsc::Sender<InboundEvent>>>>,
    /// Buffered outbound messages per room, waiting to be polled.
    outbound: Arc<RwLock<HashMap<RoomId, Vec<OutboundMessage>>>>,
    /// Uploaded media bytes keyed by handle id.
    media: Arc<RwLock<HashMap<String, StoredMedia>>>,
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
}

struct StoredMedia {
    mime: String,
    data: Vec<u8>,
}

/// Shared state for axum handlers.
#[derive(Clone)]
struct AppState {
    inbound_tx: Arc<RwLock<Option<mpsc::Sender<InboundEvent>>>>,
    outbound: Arc<RwLock<HashMap<RoomId, Vec<OutboundMessage>>>>,
    media: Arc<RwLock<HashMap<String, StoredMedia>>>,
}

/// Inbound webhook request body.
#[derive(Debug, Deserialize)]
struct EventRequest {
    room_id: String,
    sender: String,
    /// Absent for encrypted-event wrappers.
    body: Option<String>,
    #[serde(default)]
    is_edit: bool,
}

/// A buffered outbound message waiting to be polled.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundMessage {
    Image {
        title: String,
        url: String,
        mimetype: String,
        size: usize,
        width: Option<u32>,
        height: Option<u32>,
        external_url: Option<String>,
    },
    Text {
        /// Event id being replied to.
        in_reply_to: String,
        body: String,
    },
}

/// Response from the poll endpoint.
#[derive(Debug, Serialize)]
struct PollResponse {
    messages: Vec<OutboundMessage>,
}

impl WebhookTransport {
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            bind: bind.into(),
            port,
            inbound_tx: Arc::new(RwLock::new(None)),
            outbound: Arc::new(RwLock::new(HashMap::new())),
            media: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: Arc::new(RwLock::new(None)),
        }
    }

    async fn push_outbound(&self, room_id: &RoomId, message: OutboundMessage) {
        self.outbound
            .write()
            .await
            .entry(room_id.clone())
            .or_default()
            .push(message);
    }
}

impl Transport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        *self.inbound_tx.write().await = Some(inbound_tx);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let state = AppState {
            inbound_tx: self.inbound_tx.clone(),
            outbound: self.outbound.clone(),
            media: self.media.clone(),
        };

        let app = Router::new()
            .route("/event", post(handle_event))
            .route("/poll/{room_id}", get(handle_poll))
            .route("/media/{id}", get(handle_media))
            .route("/health", get(handle_health))
            .with_state(state);

        let bind = if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        };
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind webhook server to {bind}"))?;
        tracing::info!(%bind, "webhook server listening");

        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                tracing::error!(%error, "webhook server exited with error");
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn send_image(&self, room_id: &RoomId, image: &Image) -> crate::Result<()> {
        self.push_outbound(
            room_id,
            OutboundMessage::Image {
                title: image.title.clone(),
                url: image.url.to_string(),
                mimetype: image.info.mimetype.clone(),
                size: image.info.size,
                width: image.info.width,
                height: image.info.height,
                external_url: image.external_url.clone(),
            },
        )
        .await;
        Ok(())
    }

    async fn reply(&self, event: &InboundEvent, text: &str) -> crate::Result<()> {
        self.push_outbound(
            &event.room_id,
            OutboundMessage::Text {
                in_reply_to: event.event_id.clone(),
                body: text.to_string(),
            },
        )
        .await;
        Ok(())
    }

    async fn upload(&self, data: Vec<u8>, mime: &str) -> crate::Result<ContentUri> {
        let id = uuid::Uuid::new_v4().to_string();
        self.media.write().await.insert(
            id.clone(),
            StoredMedia {
                mime: mime.to_string(),
                data,
            },
        );
        Ok(ContentUri::from(format!("media://{id}")))
    }

    async fn shutdown(&self) -> crate::Result<()> {
        if let Some(tx) = self.shutdown_tx.read().await.as_ref() {
            tx.send(()).await.ok();
        }
        tracing::info!("webhook transport shut down");
        Ok(())
    }
}

// -- Axum handlers --

async fn handle_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let tx = state.inbound_tx.read().await;
    let Some(tx) = tx.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "webhook not initialized".into(),
        ));
    };

    let event = InboundEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        room_id: Arc::from(request.room_id.as_str()),
        sender: Arc::from(request.sender.as_str()),
        body: request.body,
        is_edit: request.is_edit,
        timestamp: chrono::Utc::now(),
    };

    tx.send(event)
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "channel closed".into()))?;

    Ok(StatusCode::ACCEPTED)
}

async fn handle_poll(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Json<PollResponse> {
    let key: RoomId = Arc::from(room_id.as_str());
    let messages = state
        .outbound
        .write()
        .await
        .remove(&key)
        .unwrap_or_default();

    Json(PollResponse { messages })
}

async fn handle_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let media = state.media.read().await;
    match media.get(&id) {
        Some(stored) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, stored.mime.clone())],
            stored.data.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}
