use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::core::error::{ExecutionError, Result};
use crate::core::execution::{ExecutionContext, ExecutionLogic, StepOutcome};
use crate::core::output::RENDER_KEY;
use crate::core::result::ResultContract;
use crate::core::schema::ExecutionSchema;
use crate::core::value::Params;
use crate::sources::media::{Frame, MediaEncoder};

/// A fetch that did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}")]
pub struct FetchFailure {
    pub status: String,
}

impl FetchFailure {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Retrieves a URL in full. Retrying, if any, is the fetcher's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Fetched, FetchFailure>;
}

/// Fetches `url` once during set-up and publishes it as `render`.
///
/// A failed fetch ends the execution before the loop runs.
pub struct RemoteSnapshot {
    fetcher: Arc<dyn Fetcher>,
    encoder: Arc<dyn MediaEncoder>,
    payload: Option<Fetched>,
}

impl RemoteSnapshot {
    pub fn new(fetcher: Arc<dyn Fetcher>, encoder: Arc<dyn MediaEncoder>) -> Self {
        Self {
            fetcher,
            encoder,
            payload: None,
        }
    }
}

#[async_trait]
impl ExecutionLogic for RemoteSnapshot {
    fn schema(&self) -> ExecutionSchema {
        ExecutionSchema::new()
            .input("url", "What to fetch")
            .output(RENDER_KEY, "The fetched payload")
            .output("bytes", "Payload size, reported at the end")
    }

    async fn setup(&mut self, params: &Params, _ctx: &mut ExecutionContext) -> Result<()> {
        let url = params.str("url")?;
        let fetched =
            self.fetcher
                .fetch(url)
                .await
                .map_err(|failure| ExecutionError::UpstreamFetch {
                    url: url.to_string(),
                    status: failure.status,
                })?;
        log::debug!("Fetched {} bytes from {}", fetched.body.len(), url);
        self.payload = Some(fetched);
        Ok(())
    }

    async fn step(&mut self, ctx: &mut ExecutionContext) -> Result<StepOutcome> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| ExecutionError::internal("nothing was fetched"))?;
        if ctx.is_requested(RENDER_KEY) {
            let frame = Frame::encoded(
                payload
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
                payload.body.clone(),
            );
            ctx.publish(RENDER_KEY, self.encoder.encode(&frame)?)?;
        }
        Ok(StepOutcome::Finished)
    }

    async fn finish(&mut self, _ctx: &mut ExecutionContext) -> Result<ResultContract> {
        let bytes = self.payload.as_ref().map_or(0, |p| p.body.len() as u64);
        Ok(ResultContract::named([("bytes", bytes)]))
    }
}
