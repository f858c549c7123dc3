//! Shared test doubles: a scriptable source and a recording transport.

use crate::source::registry::SourceContext;
use crate::source::reupload::Reuploader;
use crate::source::traits::{FetchError, FetchResult, Image, ImageInfo, Source};
use crate::tasks::BackgroundTasks;
use crate::transport::{InboundStream, Transport, TransportDyn};
use crate::{ContentUri, InboundEvent, RoomId};
use std::sync::{Arc, Mutex};

/// A source with a scripted outcome sequence: a number of initial
/// failures, then a (possibly unlimited) run of successes, then
/// cancellations.
pub(crate) struct StubSource {
    title: String,
    state: Mutex<StubState>,
}

struct StubState {
    failures_left: usize,
    successes_left: Option<usize>,
}

impl StubSource {
    /// Endless successes, every image titled `title`.
    pub(crate) fn named(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            state: Mutex::new(StubState {
                failures_left: 0,
                successes_left: None,
            }),
        }
    }

    /// `successes` images, then cancellation forever.
    pub(crate) fn with_results(successes: usize, cancel_after: bool) -> Self {
        assert!(cancel_after, "only the cancelling variant is scripted");
        Self {
            title: "stub".into(),
            state: Mutex::new(StubState {
                failures_left: 0,
                successes_left: Some(successes),
            }),
        }
    }

    /// `failures` hard errors, then endless successes.
    pub(crate) fn failing_then_ok(failures: usize) -> Self {
        Self {
            title: "stub".into(),
            state: Mutex::new(StubState {
                failures_left: failures,
                successes_left: None,
            }),
        }
    }

    fn image(&self) -> Image {
        Image {
            title: self.title.clone(),
            url: Arc::from("media://stub"),
            info: ImageInfo {
                mimetype: "image/png".into(),
                size: 64,
                width: Some(3),
                height: Some(2),
                ..Default::default()
            },
            external_url: None,
        }
    }
}

impl Source for StubSource {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch(&self) -> FetchResult {
        let mut state = self.state.lock().unwrap();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(FetchError::Other(anyhow::anyhow!("scripted stub failure")));
        }
        match &mut state.successes_left {
            None => Ok(self.image()),
            Some(0) => Err(FetchError::Cancel),
            Some(left) => {
                *left -= 1;
                Ok(self.image())
            }
        }
    }
}

/// A transport that records everything it is asked to do.
pub(crate) struct MockTransport {
    sent: Mutex<Vec<(RoomId, Image)>>,
    replies: Mutex<Vec<(String, String)>>,
    uploads: Mutex<Vec<(Vec<u8>, String)>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Images posted so far, as (room id, image) pairs.
    pub(crate) async fn sent_images(&self) -> Vec<(RoomId, Image)> {
        self.sent.lock().unwrap().clone()
    }

    /// Replies sent so far, as (event id, text) pairs.
    pub(crate) async fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub(crate) async fn uploads(&self) -> Vec<(Vec<u8>, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        Ok(Box::pin(futures::stream::empty::<InboundEvent>()))
    }

    async fn send_image(&self, room_id: &RoomId, image: &Image) -> crate::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((room_id.clone(), image.clone()));
        Ok(())
    }

    async fn reply(&self, event: &InboundEvent, text: &str) -> crate::Result<()> {
        self.replies
            .lock()
            .unwrap()
            .push((event.event_id.clone(), text.to_string()));
        Ok(())
    }

    async fn upload(&self, data: Vec<u8>, mime: &str) -> crate::Result<ContentUri> {
        let mut uploads = self.uploads.lock().unwrap();
        let uri: ContentUri = Arc::from(format!("media://{}", uploads.len()));
        uploads.push((data, mime.to_string()));
        Ok(uri)
    }
}

/// A ready-to-use builder context backed by a [`MockTransport`].
pub(crate) fn source_context() -> SourceContext {
    let transport: Arc<dyn TransportDyn> = Arc::new(MockTransport::new());
    let http = reqwest::Client::new();
    SourceContext {
        reupload: Arc::new(Reuploader::new(
            http.clone(),
            transport,
            "disruptor-test",
        )),
        http,
        user_agent: "disruptor-test".into(),
        tasks: BackgroundTasks::new(),
    }
}
