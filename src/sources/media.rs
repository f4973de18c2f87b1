//! Streams frames from a media source at the source's own frame rate.
//!
//! Decoding and encoding are host concerns: a [`MediaOpener`] turns a
//! location into a [`MediaSource`], and a [`MediaEncoder`] turns a frame into
//! a transport-safe [`MediaRef`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::error::{ExecutionError, Result};
use crate::core::execution::{ExecutionContext, ExecutionLogic, StepOutcome};
use crate::core::output::RENDER_KEY;
use crate::core::result::ResultContract;
use crate::core::schema::ExecutionSchema;
use crate::core::throttle::Throttle;
use crate::core::value::{MediaRef, Params};

/// One decoded or fetched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub mime_type: String,
    /// Width and height for raw pixel data; `None` for already-encoded payloads.
    pub dimensions: Option<(u32, u32)>,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn encoded(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            dimensions: None,
            data,
        }
    }

    pub fn raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            mime_type: "application/octet-stream".to_string(),
            dimensions: Some((width, height)),
            data,
        }
    }
}

/// A sequential frame iterator with optional metadata.
#[async_trait]
pub trait MediaSource: Send {
    /// Total frames, or `None` for live or unknown-length sources.
    fn frame_count(&self) -> Option<u64>;

    /// Frames per second, or `None` when the source cannot tell.
    fn frame_rate(&self) -> Option<f64>;

    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Opens a [`MediaSource`] from a location such as a file path.
#[async_trait]
pub trait MediaOpener: Send + Sync {
    async fn open(&self, location: &str) -> Result<Box<dyn MediaSource>>;
}

pub trait MediaEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<MediaRef>;
}

/// A source over frames already in memory.
pub struct FrameSequence {
    frames: VecDeque<Frame>,
    frame_rate: Option<f64>,
    report_count: bool,
    total: u64,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>, frame_rate: Option<f64>) -> Self {
        let total = frames.len() as u64;
        Self {
            frames: frames.into(),
            frame_rate,
            report_count: true,
            total,
        }
    }

    /// Behaves like a live source: no frame count is reported.
    pub fn without_count(mut self) -> Self {
        self.report_count = false;
        self
    }
}

#[async_trait]
impl MediaSource for FrameSequence {
    fn frame_count(&self) -> Option<u64> {
        self.report_count.then_some(self.total)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Plays a media source, publishing each frame as `render`.
pub struct MediaStreamer {
    opener: Arc<dyn MediaOpener>,
    encoder: Arc<dyn MediaEncoder>,
    source: Option<Box<dyn MediaSource>>,
    frame_count: Option<u64>,
    sent: u64,
}

impl MediaStreamer {
    pub fn new(opener: Arc<dyn MediaOpener>, encoder: Arc<dyn MediaEncoder>) -> Self {
        Self {
            opener,
            encoder,
            source: None,
            frame_count: None,
            sent: 0,
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.sent
    }
}

#[async_trait]
impl ExecutionLogic for MediaStreamer {
    fn schema(&self) -> ExecutionSchema {
        ExecutionSchema::new()
            .input("path", "Location of the media to play")
            .output(RENDER_KEY, "The current frame")
            .output("frames", "Frames sent, reported at the end")
    }

    async fn setup(&mut self, params: &Params, ctx: &mut ExecutionContext) -> Result<()> {
        let path = params.str("path")?;
        let source = self.opener.open(path).await?;
        self.frame_count = source.frame_count();
        ctx.set_interval(Throttle::interval_for_rate(source.frame_rate()));
        match self.frame_count {
            Some(n) => log::info!("Found {} frames in {}", n, path),
            None => log::info!("Streaming {} with an unknown number of frames", path),
        }
        self.source = Some(source);
        Ok(())
    }

    async fn step(&mut self, ctx: &mut ExecutionContext) -> Result<StepOutcome> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ExecutionError::internal("media source was not opened"))?;
        let Some(frame) = source.next_frame().await? else {
            return Ok(StepOutcome::Finished);
        };

        if ctx.is_requested(RENDER_KEY) {
            ctx.publish(RENDER_KEY, self.encoder.encode(&frame)?)?;
        }
        self.sent += 1;
        ctx.publish_progress(self.sent, self.frame_count)?;
        log::trace!("Sent frame {} of {:?}", self.sent, self.frame_count);
        Ok(StepOutcome::Continue)
    }

    async fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<ResultContract> {
        self.source = None;
        Ok(ResultContract::named([("frames", self.sent)]))
    }
}
