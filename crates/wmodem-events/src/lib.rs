//! # wmodem – Event broadcaster
//!
//! Fans free-text device event lines (URCs, connects, disconnects,
//! incoming messages) out to any number of subscribers, each with its
//! own bounded queue and cancel handle.

pub mod broadcaster;

pub use broadcaster::{Canceller, EventBroadcaster, Subscription, DEFAULT_BUFFER};
