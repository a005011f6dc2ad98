//! External messaging channels: the [`Channel`] trait, a reconnect
//! supervisor with exponential backoff, and a long-poll HTTP reference
//! implementation.

mod backoff;
mod channel;
mod error;
mod long_poll;
mod supervisor;

pub use backoff::Backoff;
pub use channel::{Channel, IncomingMessage, OutgoingMessage};
pub use error::ChannelError;
pub use long_poll::LongPollChannel;
pub use supervisor::run_channel;
