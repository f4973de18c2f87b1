//! Keyed, versioned publish surface for a running execution.
//!
//! An execution [`publish`](OutputSink::publish)es values into a local
//! staging area, then [`flush`](OutputSink::flush)es them. A flush commits
//! every staged key at once and ships them to the subscriber as a single
//! [`OutputBatch`], so a subscriber never sees half of an update. Nothing is
//! visible before a flush.
//!
//! Only the latest record per key is kept. A new subscriber first receives a
//! snapshot of those, then live batches.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};

use crate::core::error::{ExecutionError, Result};
use crate::core::result::{OutputRequest, RESULT_KEY};
use crate::core::value::Value;

pub const PROGRESS_KEY: &str = "progress";
pub const ERROR_KEY: &str = "error";
pub const RENDER_KEY: &str = "render";

/// Keys every execution may publish without declaring them.
pub const RESERVED_KEYS: [&str; 3] = [PROGRESS_KEY, ERROR_KEY, RESULT_KEY];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// The latest value of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub key: String,
    pub value: Value,
    /// Starts at 1 and grows by one every time the key is flushed again.
    pub version: u64,
}

/// Everything committed by one flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBatch {
    pub sequence: u64,
    pub flushed_at: DateTime<Utc>,
    /// True for the catch-up batch a new subscriber gets first.
    pub snapshot: bool,
    pub records: Vec<OutputRecord>,
}

impl OutputBatch {
    pub fn get(&self, key: &str) -> Option<&OutputRecord> {
        self.records.iter().find(|r| r.key == key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).map(|r| &r.value)
    }
}

/// What happened to a flushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing was staged.
    Empty,
    /// Committed, but nobody is subscribed.
    Unobserved,
    Delivered,
    /// The subscriber did not make room in time; it misses this batch.
    TimedOut,
    /// The subscriber went away.
    Detached,
}

struct Subscriber {
    tx: mpsc::Sender<OutputBatch>,
    request: OutputRequest,
    /// Set when a batch could not be delivered in time.
    missed: Arc<AtomicBool>,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Default)]
struct SinkShared {
    committed: BTreeMap<String, OutputRecord>,
    subscriber: Option<Subscriber>,
    declared: Option<BTreeSet<String>>,
    sequence: u64,
    closed: bool,
}

impl SinkShared {
    fn next_batch(&mut self, records: Vec<OutputRecord>, snapshot: bool) -> OutputBatch {
        self.sequence += 1;
        OutputBatch {
            sequence: self.sequence,
            flushed_at: Utc::now(),
            snapshot,
            records,
        }
    }

    fn live_subscriber(&self) -> Option<&Subscriber> {
        self.subscriber.as_ref().filter(|s| s.is_live())
    }
}

fn lock(shared: &Mutex<SinkShared>) -> MutexGuard<'_, SinkShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The execution side of the output surface.
pub struct OutputSink {
    pending: BTreeMap<String, Value>,
    declared: Option<BTreeSet<String>>,
    shared: Arc<Mutex<SinkShared>>,
    flush_timeout: Duration,
    capacity: usize,
}

impl OutputSink {
    pub fn new(flush_timeout: Duration, capacity: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            declared: None,
            shared: Arc::new(Mutex::new(SinkShared::default())),
            flush_timeout,
            capacity: capacity.max(1),
        }
    }

    /// Restricts publishable keys to `keys` plus the reserved ones.
    pub fn declare<S: Into<String>>(&mut self, keys: impl IntoIterator<Item = S>) {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        lock(&self.shared).declared = Some(keys.clone());
        self.declared = Some(keys);
    }

    /// The observer side, for subscribing.
    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
    }

    /// Stages `value` under `key`, replacing anything staged for it since the last flush.
    pub fn publish(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if let Some(declared) = &self.declared
            && !declared.contains(&key)
            && !is_reserved(&key)
        {
            return Err(ExecutionError::UndeclaredOutput(key));
        }
        self.pending.insert(key, value.into());
        Ok(())
    }

    /// Throws away everything staged since the last flush.
    pub fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            log::debug!("Discarding {} staged record(s)", self.pending.len());
            self.pending.clear();
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether the current subscriber asked for `key`. With no subscriber
    /// everything counts as requested, since a later one gets the snapshot.
    pub fn is_requested(&self, key: &str) -> bool {
        lock(&self.shared)
            .live_subscriber()
            .is_none_or(|s| s.request.wants(key))
    }

    /// The latest committed record for `key`.
    pub fn latest(&self, key: &str) -> Option<OutputRecord> {
        lock(&self.shared).committed.get(key).cloned()
    }

    /// Commits all staged records as one batch and hands it to the subscriber.
    ///
    /// Waits at most the configured flush timeout for room in the
    /// subscriber's queue; a batch that does not fit in time is dropped for
    /// that subscriber but stays committed. A subscriber that missed a batch
    /// receives a snapshot of the committed records once the sink is closed.
    pub async fn flush(&mut self) -> Delivery {
        if self.pending.is_empty() {
            return Delivery::Empty;
        }
        let staged = std::mem::take(&mut self.pending);

        let (batch, tx) = {
            let mut shared = lock(&self.shared);
            let mut records = Vec::with_capacity(staged.len());
            for (key, value) in staged {
                let version = shared.committed.get(&key).map_or(1, |r| r.version + 1);
                let record = OutputRecord {
                    key: key.clone(),
                    value,
                    version,
                };
                shared.committed.insert(key, record.clone());
                records.push(record);
            }
            let batch = shared.next_batch(records, false);
            let tx = shared
                .live_subscriber()
                .map(|s| (s.tx.clone(), Arc::clone(&s.missed)));
            (batch, tx)
        };

        let Some((tx, missed)) = tx else {
            return Delivery::Unobserved;
        };
        let sequence = batch.sequence;
        match tx.send_timeout(batch, self.flush_timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(SendTimeoutError::Timeout(_)) => {
                missed.store(true, Ordering::Release);
                log::warn!(
                    "Subscriber did not accept batch {} within {:?}, dropping it",
                    sequence,
                    self.flush_timeout
                );
                Delivery::TimedOut
            }
            Err(SendTimeoutError::Closed(_)) => {
                log::debug!("Subscriber detached before batch {}", sequence);
                Delivery::Detached
            }
        }
    }

    /// Ends the stream: the current subscriber receives what is queued, then `None`.
    pub fn close(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "Closing output sink with {} unflushed record(s)",
                self.pending.len()
            );
        }
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.subscriber = None;
    }
}

/// The observer side of an [`OutputSink`]. Cheap to clone.
#[derive(Clone)]
pub struct SinkHandle {
    shared: Arc<Mutex<SinkShared>>,
    capacity: usize,
}

impl SinkHandle {
    pub fn subscribe(&self) -> Result<Subscription> {
        self.subscribe_to(OutputRequest::All)
    }

    /// Attaches the single subscriber. Fails while another subscription is
    /// still alive; dropping a [`Subscription`] frees the slot.
    pub fn subscribe_to(&self, request: OutputRequest) -> Result<Subscription> {
        let mut shared = lock(&self.shared);
        if shared.live_subscriber().is_some() {
            return Err(ExecutionError::AlreadySubscribed);
        }
        if let Some(declared) = &shared.declared
            && let Some(unknown) = request
                .keys()
                .find(|k| !declared.contains(*k) && !is_reserved(k))
        {
            return Err(ExecutionError::UndeclaredOutput(unknown.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let missed = Arc::new(AtomicBool::new(false));
        if !shared.committed.is_empty() {
            let records = shared.committed.values().cloned().collect();
            let snapshot = shared.next_batch(records, true);
            // fresh channel with capacity >= 1, cannot be full
            let _ = tx.try_send(snapshot);
        }
        if shared.closed {
            log::debug!("Subscribed to a closed sink, only the snapshot will be delivered");
        } else {
            shared.subscriber = Some(Subscriber {
                tx,
                request,
                missed: Arc::clone(&missed),
            });
        }
        Ok(Subscription {
            rx,
            shared: Arc::clone(&self.shared),
            missed,
            caught_up: false,
        })
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.shared).live_subscriber().is_some()
    }
}

/// A stream of [`OutputBatch`]es. Ends once the execution has terminated.
///
/// If a flush timed out on this subscription, the stream yields one
/// snapshot batch of the committed records after the sink closes, so the
/// terminal `error` or `result` record is never lost to a slow reader.
pub struct Subscription {
    rx: mpsc::Receiver<OutputBatch>,
    shared: Arc<Mutex<SinkShared>>,
    missed: Arc<AtomicBool>,
    caught_up: bool,
}

impl Subscription {
    pub async fn next_batch(&mut self) -> Option<OutputBatch> {
        match self.rx.recv().await {
            Some(batch) => Some(batch),
            None => self.catch_up(),
        }
    }

    /// Takes an already-queued batch without waiting.
    pub fn try_next_batch(&mut self) -> Option<OutputBatch> {
        match self.rx.try_recv() {
            Ok(batch) => Some(batch),
            Err(TryRecvError::Disconnected) => self.catch_up(),
            Err(TryRecvError::Empty) => None,
        }
    }

    fn catch_up(&mut self) -> Option<OutputBatch> {
        if self.caught_up || !self.missed.load(Ordering::Acquire) {
            return None;
        }
        let mut shared = lock(&self.shared);
        if !shared.closed {
            return None;
        }
        self.caught_up = true;
        let records = shared.committed.values().cloned().collect();
        let batch = shared.next_batch(records, true);
        log::debug!(
            "Replaying {} committed record(s) to a subscriber that missed a batch",
            batch.records.len()
        );
        Some(batch)
    }
}

impl Stream for Subscription {
    type Item = OutputBatch;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(None) => Poll::Ready(self.catch_up()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sink() -> OutputSink {
        OutputSink::new(Duration::from_millis(50), 4)
    }

    #[tokio::test]
    async fn test_nothing_visible_before_flush() {
        let mut sink = sink();
        let mut sub = sink.handle().subscribe().unwrap();
        sink.publish("progress", 10i64).unwrap();
        assert!(sub.try_next_batch().is_none());
        assert_eq!(sink.latest("progress"), None);

        assert_eq!(sink.flush().await, Delivery::Delivered);
        let batch = sub.next().await.unwrap();
        assert_eq!(batch.value("progress"), Some(&Value::Int(10)));
    }

    #[tokio::test]
    async fn test_batch_carries_only_latest_value_per_key() {
        let mut sink = sink();
        let mut sub = sink.handle().subscribe().unwrap();
        sink.publish("progress", 1i64).unwrap();
        sink.publish("render", "a").unwrap();
        sink.publish("progress", 2i64).unwrap();
        sink.publish("progress", 3i64).unwrap();
        sink.flush().await;

        let batch = sub.next_batch().await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.value("progress"), Some(&Value::Int(3)));
        assert_eq!(batch.get("progress").unwrap().version, 1);
        assert!(!batch.snapshot);
    }

    #[tokio::test]
    async fn test_versions_increase_per_key() {
        let mut sink = sink();
        let mut sub = sink.handle().subscribe().unwrap();
        for i in 0..3i64 {
            sink.publish("cursor", i).unwrap();
            sink.flush().await;
        }
        let versions: Vec<u64> = (0..3)
            .map(|_| sub.try_next_batch().unwrap().get("cursor").unwrap().version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let mut sink = sink();
        let mut sub = sink.handle().subscribe().unwrap();
        assert_eq!(sink.flush().await, Delivery::Empty);
        assert!(sub.try_next_batch().is_none());
    }

    #[tokio::test]
    async fn test_single_subscriber_and_resubscribe_snapshot() {
        let mut sink = sink();
        let handle = sink.handle();
        let first = handle.subscribe().unwrap();
        assert_eq!(
            handle.subscribe().err(),
            Some(ExecutionError::AlreadySubscribed)
        );

        sink.publish("cursor", 1i64).unwrap();
        sink.flush().await;
        sink.publish("cursor", 2i64).unwrap();
        sink.flush().await;
        drop(first);

        let mut second = handle.subscribe().unwrap();
        let snapshot = second.next_batch().await.unwrap();
        assert!(snapshot.snapshot);
        assert_eq!(snapshot.value("cursor"), Some(&Value::Int(2)));
        assert_eq!(snapshot.get("cursor").unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_flush_without_subscriber_still_commits() {
        let mut sink = sink();
        sink.publish("progress", 50i64).unwrap();
        assert_eq!(sink.flush().await, Delivery::Unobserved);
        assert_eq!(sink.latest("progress").unwrap().version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_does_not_block_forever() {
        let mut sink = OutputSink::new(Duration::from_millis(20), 1);
        let _sub = sink.handle().subscribe().unwrap();

        sink.publish("cursor", 1i64).unwrap();
        assert_eq!(sink.flush().await, Delivery::Delivered);
        sink.publish("cursor", 2i64).unwrap();
        assert_eq!(sink.flush().await, Delivery::TimedOut);
        assert_eq!(sink.latest("cursor").unwrap().value, Value::Int(2));
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let mut sink = sink();
        let mut sub = sink.handle().subscribe().unwrap();
        sink.publish("error", "boom").unwrap();
        sink.flush().await;
        sink.close();

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_declared_keys_are_enforced() {
        let mut sink = sink();
        sink.declare(["cursor"]);
        assert!(sink.publish("cursor", 1i64).is_ok());
        assert!(sink.publish("progress", 1i64).is_ok());
        assert_eq!(
            sink.publish("render", "x"),
            Err(ExecutionError::UndeclaredOutput("render".into()))
        );
        assert!(
            sink.handle()
                .subscribe_to(OutputRequest::only(["render"]))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_requested_outputs() {
        let sink = sink();
        assert!(sink.is_requested("render"));
        assert!(!sink.handle().is_subscribed());
        let sub = sink
            .handle()
            .subscribe_to(OutputRequest::only(["progress"]))
            .unwrap();
        assert!(sink.is_requested("progress"));
        assert!(!sink.is_requested("render"));
        assert!(sink.handle().is_subscribed());
        drop(sub);
        assert!(!sink.handle().is_subscribed());
        assert!(sink.is_requested("render"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_still_receives_terminal_records() {
        let mut sink = OutputSink::new(Duration::from_millis(20), 1);
        let mut sub = sink.handle().subscribe().unwrap();

        sink.publish("cursor", 1i64).unwrap();
        assert_eq!(sink.flush().await, Delivery::Delivered);
        sink.publish("error", "boom").unwrap();
        assert_eq!(sink.flush().await, Delivery::TimedOut);
        sink.close();

        let first = sub.next_batch().await.unwrap();
        assert!(!first.snapshot);
        assert_eq!(first.value("cursor"), Some(&Value::Int(1)));

        let last = sub.next_batch().await.unwrap();
        assert!(last.snapshot);
        assert_eq!(last.value("error"), Some(&Value::Text("boom".into())));
        assert_eq!(last.value("cursor"), Some(&Value::Int(1)));
        assert!(sub.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn test_no_replay_when_nothing_was_missed() {
        let mut sink = sink();
        let sub = sink.handle().subscribe().unwrap();
        sink.publish("cursor", 1i64).unwrap();
        sink.flush().await;
        sink.close();

        let batches: Vec<_> = sub.collect().await;
        assert_eq!(batches.len(), 1);
        assert!(!batches[0].snapshot);
    }
}
