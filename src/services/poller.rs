//! Background poller for the DWD warning feed.
//!
//! Architecture:
//! - One spawned task owns the poll loop, the last accepted document time and
//!   the sending half of the output queue. Dropping that task's state is the
//!   only way the queue closes, so it closes exactly once.
//! - The loop waits on a stop signal, a refresh channel and the ticker, in
//!   that order of priority. A pending refresh or tick never delays a stop.
//! - Each cycle: fetch -> unwrap -> parse -> timestamp check -> match ->
//!   push. Documents whose `time` is not newer than the last accepted one are
//!   discarded whole.
//! - Pushes wait for queue capacity (backpressure), but a stop requested while
//!   waiting ends the loop and drops the undelivered rest.
//! - Stop is only observed between network calls: an in-flight fetch runs to
//!   completion or to its 90 s timeout first.
//! - The loop publishes its timestamp gate and statistics through a `watch`
//!   channel and drops the sender on exit. `WarningPoller` reads the last
//!   published value and never touches loop state directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::errors::WarnError;
use crate::models::Warning;
use crate::services::dwd::{parse_weather_info, FeedClient};
use crate::services::matcher::LocationMatcher;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Capacity of the warning queue handed to the consumer.
pub const WARNING_QUEUE_CAPACITY: usize = 8;

/// Default time between scheduled polls (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;

/// Pending refresh requests; further requests are coalesced.
const REFRESH_QUEUE_CAPACITY: usize = 1;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Counters and timestamps published by the poll loop.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct PollStats {
    /// Publication time of the last accepted document.
    pub last_document_time: Option<DateTime<Utc>>,
    pub last_poll_completed_at: Option<DateTime<Utc>>,
    pub total_polls: u64,
    pub documents_accepted: u64,
    /// Documents skipped because their time was not newer.
    pub documents_unchanged: u64,
    pub failed_polls: u64,
    pub warnings_dispatched: u64,
    pub last_error: Option<String>,
}

/// Poller status, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollerStatus {
    pub active: bool,
    pub poll_interval_secs: u64,
    pub location_patterns: Vec<String>,
    pub stats: PollStats,
}

// ---------------------------------------------------------------------------
// Document time gate
// ---------------------------------------------------------------------------

/// Accepts a document only if it is strictly newer than the last one accepted.
#[derive(Debug, Clone, Copy, Default)]
struct TimestampGate {
    last_seen: Option<i64>,
}

impl TimestampGate {
    fn accept(&mut self, time: i64) -> bool {
        match self.last_seen {
            Some(last) if time <= last => false,
            _ => {
                self.last_seen = Some(time);
                true
            }
        }
    }
}

/// State carried from one run of the loop to the next.
#[derive(Debug, Clone, Default)]
struct LoopSnapshot {
    gate: TimestampGate,
    stats: PollStats,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum RunState {
    Idle(LoopSnapshot),
    Active(ActiveLoop),
}

struct ActiveLoop {
    refresh: mpsc::Sender<()>,
    stop: watch::Sender<bool>,
    snapshot: watch::Receiver<LoopSnapshot>,
}

impl ActiveLoop {
    fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// The loop drops its snapshot sender when it exits.
    fn has_exited(&self) -> bool {
        self.snapshot.has_changed().is_err()
    }
}

/// Replace a loop that has exited with its last published state.
fn settle(run: &mut RunState) {
    let last = match &*run {
        RunState::Active(active) if active.has_exited() => active.snapshot.borrow().clone(),
        _ => return,
    };
    *run = RunState::Idle(last);
}

async fn wait_for_exit(mut snapshot: watch::Receiver<LoopSnapshot>) {
    while snapshot.changed().await.is_ok() {}
}

struct PollerInner {
    feed: FeedClient,
    matcher: Arc<LocationMatcher>,
    interval: Duration,
    run: Mutex<RunState>,
}

/// Control handle for the background poller. Cheap to clone.
#[derive(Clone)]
pub struct WarningPoller {
    inner: Arc<PollerInner>,
}

impl WarningPoller {
    /// Build an idle poller. The interval must be non-zero.
    pub fn new(
        feed: FeedClient,
        matcher: LocationMatcher,
        interval: Duration,
    ) -> Result<Self, WarnError> {
        if interval.is_zero() {
            return Err(WarnError::Config(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(PollerInner {
                feed,
                matcher: Arc::new(matcher),
                interval,
                run: Mutex::new(RunState::Idle(LoopSnapshot::default())),
            }),
        })
    }

    /// Spawn the poll loop and return the receiving end of its warning queue.
    ///
    /// The first poll happens immediately. Each run gets a fresh queue, which
    /// closes when the run ends. The last accepted document time carries over
    /// from previous runs. If a previous run is still stopping, this waits for
    /// it to exit first.
    pub async fn start(&self) -> Result<mpsc::Receiver<Warning>, WarnError> {
        loop {
            let mut run = self.inner.run.lock().await;
            settle(&mut run);

            let previous = match &*run {
                RunState::Idle(last) => Ok(last.clone()),
                RunState::Active(active) if active.is_stopping() => {
                    Err(active.snapshot.clone())
                }
                RunState::Active(_) => return Err(WarnError::AlreadyActive),
            };
            let last = match previous {
                Ok(last) => last,
                Err(snapshot) => {
                    drop(run);
                    wait_for_exit(snapshot).await;
                    continue;
                }
            };

            let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
            let (stop_tx, stop_rx) = watch::channel(false);
            let (warning_tx, warning_rx) = mpsc::channel(WARNING_QUEUE_CAPACITY);
            let gate = last.gate;
            let (snapshot_tx, snapshot_rx) = watch::channel(last);

            let poll_loop = PollLoop {
                feed: self.inner.feed.clone(),
                matcher: Arc::clone(&self.inner.matcher),
                interval: self.inner.interval,
                refresh: refresh_rx,
                stop: stop_rx,
                output: warning_tx,
                snapshot: snapshot_tx,
                gate,
            };
            tokio::spawn(poll_loop.run());

            *run = RunState::Active(ActiveLoop {
                refresh: refresh_tx,
                stop: stop_tx,
                snapshot: snapshot_rx,
            });

            return Ok(warning_rx);
        }
    }

    /// Stop the poll loop and wait until it has exited.
    ///
    /// The poller reports inactive as soon as the stop is signalled. When this
    /// returns the warning queue is closed. Stopping an idle poller is a no-op.
    /// If this future is dropped early, the loop still stops and keeps its
    /// state for the next call.
    pub async fn stop(&self) -> Result<(), WarnError> {
        let snapshot = {
            let run = self.inner.run.lock().await;
            let RunState::Active(active) = &*run else {
                tracing::debug!("Poller: stop requested while idle");
                return Ok(());
            };
            active.stop.send_replace(true);
            active.snapshot.clone()
        };

        wait_for_exit(snapshot).await;

        settle(&mut *self.inner.run.lock().await);
        Ok(())
    }

    /// Ask the running loop for an immediate poll.
    ///
    /// A refresh that finds another one pending is coalesced.
    pub async fn refresh(&self) -> Result<(), WarnError> {
        let run = self.inner.run.lock().await;

        let RunState::Active(active) = &*run else {
            return Err(WarnError::NotActive);
        };
        if active.is_stopping() {
            return Err(WarnError::NotActive);
        }

        match active.refresh.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Poller: refresh already pending");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(WarnError::NotActive),
        }
    }

    pub async fn is_active(&self) -> bool {
        matches!(&*self.inner.run.lock().await, RunState::Active(active) if !active.is_stopping())
    }

    pub async fn status(&self) -> PollerStatus {
        let run = self.inner.run.lock().await;

        let (active, stats) = match &*run {
            RunState::Active(active) => (
                !active.is_stopping(),
                active.snapshot.borrow().stats.clone(),
            ),
            RunState::Idle(last) => (false, last.stats.clone()),
        };

        PollerStatus {
            active,
            poll_interval_secs: self.inner.interval.as_secs(),
            location_patterns: self
                .inner
                .matcher
                .patterns()
                .into_iter()
                .map(String::from)
                .collect(),
            stats,
        }
    }

    /// Fetch the current document and return the matching warnings.
    ///
    /// Independent of the poll loop: no timestamp check, nothing queued.
    pub async fn get_warnings(&self) -> Result<Vec<Warning>, WarnError> {
        let info = self.inner.feed.fetch_info().await.map_err(|e| {
            tracing::error!("Failed to fetch data from DWD: {}", e);
            e
        })?;
        Ok(self.inner.matcher.select(info))
    }

    /// Match an already unwrapped JSON payload.
    pub fn process_warnings(&self, payload: &[u8]) -> Result<Vec<Warning>, WarnError> {
        let info = parse_weather_info(payload)?;
        Ok(self.inner.matcher.select(info))
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Resolves once a stop is signalled or the handle is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

struct PollLoop {
    feed: FeedClient,
    matcher: Arc<LocationMatcher>,
    interval: Duration,
    refresh: mpsc::Receiver<()>,
    stop: watch::Receiver<bool>,
    output: mpsc::Sender<Warning>,
    snapshot: watch::Sender<LoopSnapshot>,
    gate: TimestampGate,
}

impl PollLoop {
    /// Run until stopped.
    async fn run(mut self) {
        tracing::info!(
            "Background poller started, polling {} every {}s",
            self.feed.url(),
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => break,
                Some(()) = self.refresh.recv() => {
                    tracing::debug!("Poller: refresh requested");
                    if self.poll_once().await == Flow::Stop {
                        break;
                    }
                    ticker.reset();
                }
                _ = ticker.tick() => {
                    tracing::debug!("Poller: check warnings");
                    if self.poll_once().await == Flow::Stop {
                        break;
                    }
                }
            }
        }

        tracing::info!("Background poller stopped");

        // Close the queue before the snapshot sender announces the exit.
        drop(self.output);
    }

    fn stopping(&self) -> bool {
        *self.stop.borrow()
    }

    async fn poll_once(&mut self) -> Flow {
        let fetched = self.feed.fetch_info().await;

        // A stop that arrived mid-fetch discards the document untouched.
        if self.stopping() {
            tracing::debug!("Poller: stop requested during fetch, discarding result");
            return Flow::Stop;
        }

        let info = match fetched {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("Poller: cannot load warnings from DWD: {}", e);
                self.snapshot.send_modify(|s| {
                    s.stats.total_polls += 1;
                    s.stats.failed_polls += 1;
                    s.stats.last_poll_completed_at = Some(Utc::now());
                    s.stats.last_error = Some(e.to_string());
                });
                return Flow::Continue;
            }
        };

        if !self.gate.accept(info.time) {
            tracing::debug!(
                "Poller: data at {} has already been processed",
                info.timestamp().format("%Y-%m-%d %H:%M")
            );
            self.snapshot.send_modify(|s| {
                s.stats.total_polls += 1;
                s.stats.documents_unchanged += 1;
                s.stats.last_poll_completed_at = Some(Utc::now());
            });
            return Flow::Continue;
        }

        let document_time = info.timestamp();
        let (active, preliminary) = info.warning_count();
        tracing::debug!(
            "Poller: process {} warnings and {} preliminary warnings",
            active,
            preliminary
        );

        let selected = self.matcher.select(info);

        let gate = self.gate;
        self.snapshot.send_modify(|s| {
            s.gate = gate;
            s.stats.total_polls += 1;
            s.stats.documents_accepted += 1;
            s.stats.last_document_time = Some(document_time);
            s.stats.last_poll_completed_at = Some(Utc::now());
            s.stats.last_error = None;
        });

        self.deliver(selected).await
    }

    /// Push warnings in order, waiting for queue capacity.
    ///
    /// Refresh requests stay pending until delivery is done.
    async fn deliver(&mut self, warnings: Vec<Warning>) -> Flow {
        let mut pending = warnings.into_iter();

        while let Some(warning) = pending.next() {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop) => {
                    tracing::debug!(
                        "Poller: stopping with {} undelivered warnings",
                        1 + pending.len()
                    );
                    return Flow::Stop;
                }
                permit = self.output.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(warning);
                        self.snapshot.send_modify(|s| s.stats.warnings_dispatched += 1);
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Poller: warning queue has no receiver, discarding {} warnings",
                            1 + pending.len()
                        );
                        return Flow::Continue;
                    }
                },
            }
        }

        Flow::Continue
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
