//! The polling core: one worker, one tick at a time.
//!
//! Each tick samples the DND gate, drains both channels, routes fresh
//! events through the dispatcher, and ages out old ledger entries. The
//! gate is read at tick boundaries only; a flip mid-tick takes effect on
//! the next tick. A failing channel never blocks the other, and a failing
//! tick never terminates the loop.

use crate::dispatch::{Outcome, ReplyDispatcher};
use crate::ledger::DedupLedger;
use aside_core::config::MonitorSettings;
use aside_core::{normalize, ActivityEntry, DndGate, EventSource, StatusBoard, StatusSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct MonitorLoop {
    settings: MonitorSettings,
    gate: Arc<DndGate>,
    sources: Vec<Arc<dyn EventSource>>,
    dispatcher: ReplyDispatcher,
    ledger: DedupLedger,
    board: Arc<StatusBoard>,
    snapshot: StatusSnapshot,
}

impl MonitorLoop {
    pub fn new(
        settings: MonitorSettings,
        gate: Arc<DndGate>,
        sources: Vec<Arc<dyn EventSource>>,
        dispatcher: ReplyDispatcher,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            settings,
            gate,
            sources,
            dispatcher,
            ledger: DedupLedger::new(),
            board,
            snapshot: StatusSnapshot::default(),
        }
    }

    /// Run one tick at `now`. Exposed so tests can drive the loop
    /// deterministically without waiting on wall-clock intervals.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.snapshot.ticks += 1;
        self.snapshot.last_tick = Some(now);

        // Hard gate: while idle there is no polling, no ledger mutation
        // (eviction included), and no sends.
        if !self.gate.is_enabled() {
            self.publish();
            return Ok(());
        }

        let mut failed_channels = 0usize;
        let sources = self.sources.clone();
        for source in &sources {
            let channel = source.channel();
            let window = self.settings.recency_window(channel);
            let watermark = now - window;

            let events = match source.poll(watermark).await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(%channel, error = %e, "channel poll failed, continuing with the rest");
                    failed_channels += 1;
                    continue;
                }
            };

            for event in events {
                // The store can hand back records the watermark query
                // should have excluded (out-of-band flag updates, clock
                // skew). Stale events are silently ignored, never retried.
                if event.occurred_at < watermark {
                    tracing::trace!(%channel, at = %event.occurred_at, "event outside recency window");
                    continue;
                }

                let identity = normalize(&event.raw_identity);
                let outcome = self.dispatcher.handle(&mut self.ledger, &event, &identity).await;
                match outcome {
                    Outcome::Sent => {
                        self.snapshot.replies_sent += 1;
                        self.record(now, &event, &identity, outcome);
                    }
                    Outcome::Failed | Outcome::SkippedNotWhitelisted => {
                        self.record(now, &event, &identity, outcome);
                    }
                    // Unread/unanswered rows are re-polled every tick
                    // until they age out; logging each skip would drown
                    // the activity feed.
                    Outcome::SkippedAlreadyHandled => {
                        tracing::trace!(%channel, identity = %identity, "already handled");
                    }
                }
            }
        }

        self.ledger.evict_older_than(now - self.settings.ledger_retention());
        self.publish();

        if !self.sources.is_empty() && failed_channels == self.sources.len() {
            anyhow::bail!("all {failed_channels} channels failed to poll");
        }
        Ok(())
    }

    fn record(
        &mut self,
        now: DateTime<Utc>,
        event: &aside_core::Event,
        identity: &aside_core::CanonicalIdentity,
        outcome: Outcome,
    ) {
        self.snapshot.push_activity(ActivityEntry {
            at: now,
            channel: event.channel,
            identity: identity.as_str().to_string(),
            outcome: outcome.label().to_string(),
        });
    }

    fn publish(&mut self) {
        self.snapshot.ledger_size = self.ledger.len();
        self.board.publish(self.snapshot.clone());
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Start the worker. Ticks at the configured interval; a failed tick
    /// is logged and followed by the longer error backoff. Shutdown is
    /// clean between ticks via the returned handle.
    pub fn spawn(mut self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.tick_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                tick_secs = self.settings.tick_interval_secs,
                "monitor loop started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.run_tick(Utc::now()).await {
                            tracing::error!(error = %e, "tick failed, backing off");
                            tokio::time::sleep(self.settings.error_backoff()).await;
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("monitor loop stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the worker to finish its current tick.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}
