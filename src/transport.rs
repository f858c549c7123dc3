//! Chat transport trait and dynamic dispatch companion.

pub mod webhook;

use crate::source::Image;
use crate::{ContentUri, InboundEvent, RoomId};
use futures::Stream;
use std::pin::Pin;

/// Inbound event stream type.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Static trait for chat transports.
/// Use this for type-safe implementations.
pub trait Transport: Send + Sync + 'static {
    /// Unique name for this transport.
    fn name(&self) -> &str;

    /// Start the transport and return the inbound event stream.
    fn start(&self) -> impl std::future::Future<Output = crate::Result<InboundStream>> + Send;

    /// Post an image into a room.
    fn send_image(
        &self,
        room_id: &RoomId,
        image: &Image,
    ) -> impl std::future::Future<Output = crate::Result<()>> + Send;

    /// Reply to an event with plain text.
    fn reply(
        &self,
        event: &InboundEvent,
        text: &str,
    ) -> impl std::future::Future<Output = crate::Result<()>> + Send;

    /// Re-host media bytes and return an opaque content handle.
    fn upload(
        &self,
        data: Vec<u8>,
        mime: &str,
    ) -> impl std::future::Future<Output = crate::Result<ContentUri>> + Send;

    /// Graceful shutdown.
    fn shutdown(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn TransportDyn>` for storing a transport
/// behind a trait object.
pub trait TransportDyn: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<InboundStream>> + Send + 'a>>;

    fn send_image<'a>(
        &'a self,
        room_id: &'a RoomId,
        image: &'a Image,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>>;

    fn reply<'a>(
        &'a self,
        event: &'a InboundEvent,
        text: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>>;

    fn upload<'a>(
        &'a self,
        data: Vec<u8>,
        mime: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<ContentUri>> + Send + 'a>>;

    fn shutdown<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>>;
}

/// Blanket implementation: any type implementing Transport automatically
/// implements TransportDyn.
impl<T: Transport> TransportDyn for T {
    fn name(&self) -> &str {
        Transport::name(self)
    }

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<InboundStream>> + Send + 'a>> {
        Box::pin(Transport::start(self))
    }

    fn send_image<'a>(
        &'a self,
        room_id: &'a RoomId,
        image: &'a Image,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>> {
        Box::pin(Transport::send_image(self, room_id, image))
    }

    fn reply<'a>(
        &'a self,
        event: &'a InboundEvent,
        text: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>> {
        Box::pin(Transport::reply(self, event, text))
    }

    fn upload<'a>(
        &'a self,
        data: Vec<u8>,
        mime: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<ContentUri>> + Send + 'a>> {
        Box::pin(Transport::upload(self, data, mime))
    }

    fn shutdown<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = crate::Result<()>> + Send + 'a>> {
        Box::pin(Transport::shutdown(self))
    }
}
