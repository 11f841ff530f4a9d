//! Typed command results.

pub mod channel;

pub use channel::{channels_from_data, Channel, ChannelKind};
