use async_trait::async_trait;

use crate::error::ChannelError;

/// A message arriving from an external channel, destined for [`pith_core::Runtime::submit_turn`].
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub text: String,
}

/// A message to relay back out over the channel once a turn finishes.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub text: String,
}

/// An external messaging integration. One `Channel` is driven by one
/// long-running supervised task ([`crate::supervisor::run_channel`]) for
/// the lifetime of the server process.
///
/// `connect`/`recv`/`send` take `&mut self` rather than `&self` because
/// most real channels (long-poll cursors, websocket handles) carry
/// connection state that only one task ever touches at a time; there is
/// no concurrent access to a single `Channel` instance.
#[async_trait]
pub trait Channel: Send {
    /// Stable identifier used for logging and for namespacing this
    /// channel's persisted cursor/session in `AppState`.
    fn name(&self) -> &str;

    /// Establish or re-establish the underlying connection. Called once
    /// before the first `recv` and again after any `recv`/`send` failure.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Block until the next external message arrives.
    async fn recv(&mut self) -> Result<IncomingMessage, ChannelError>;

    /// Relay a turn's outcome back out over the channel.
    async fn send(&mut self, outgoing: OutgoingMessage) -> Result<(), ChannelError>;
}
