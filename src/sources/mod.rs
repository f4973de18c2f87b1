//! Ready-made executions.
//!
//! - [`cursor::CursorLoop`]: endless cursor over a fixed-length sequence
//! - [`media::MediaStreamer`]: frame-rate-paced playback of a media source
//! - [`fetch::RemoteSnapshot`]: fetch once, publish, finish
//! - [`debug`]: executions that fail or render on purpose

pub mod cursor;
pub mod debug;
pub mod fetch;
pub mod media;

#[cfg(feature = "http")]
pub mod http;
