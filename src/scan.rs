//! Row-Count Scanner
//!
//! Streams every `state_groups_state` row through a bounded channel and aggregates
//! rows per room. The producer task blocks on send when the consumer falls behind,
//! so memory stays bounded by the channel capacity. Used to discover oversized rooms
//! and to confirm that purged rooms are gone.

use crate::db::{StateRow, StateStore};
use crate::error::{DbError, JanitorError};
use crate::scheduler::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use futures::StreamExt;

/// Scanner tuning
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Rows buffered between producer and consumer
    pub channel_capacity: usize,
    /// Rows between progress checks
    pub progress_every_rows: u64,
    /// Minimum time between progress log lines
    pub progress_interval: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 50_000,
            progress_every_rows: 10_000,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Emits at most one progress report per interval, and only checks the clock every
/// `every` ticks.
#[derive(Debug)]
pub struct ProgressThrottle {
    every: u64,
    min_interval: Duration,
    counter: u64,
    last_emit: Instant,
}

impl ProgressThrottle {
    pub fn new(every: u64, min_interval: Duration) -> Self {
        Self {
            every,
            min_interval,
            counter: 0,
            last_emit: Instant::now(),
        }
    }

    /// Count one row; `true` when a progress line should be emitted now.
    pub fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter <= self.every {
            return false;
        }
        self.counter = 0;
        if self.last_emit.elapsed() >= self.min_interval {
            self.last_emit = Instant::now();
            return true;
        }
        false
    }
}

/// Percentage of an estimate reached so far. May exceed 100 since the estimate comes
/// from planner statistics; `None` when there is no usable estimate.
pub fn estimate_percent(done: u64, estimated_total: i64) -> Option<u64> {
    if estimated_total <= 0 {
        return None;
    }
    Some(((done as f64 / estimated_total as f64) * 100.0) as u64)
}

/// Row counts per room id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowCountByRoom(HashMap<String, u64>);

/// One room in a size report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSize {
    pub room_id: String,
    pub rows: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Largest rooms plus everything else folded into one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomSizeReport {
    pub rooms: Vec<RoomSize>,
    pub others: u64,
    pub total: u64,
}

impl RowCountByRoom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, room_id: &str) {
        match self.0.get_mut(room_id) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(room_id.to_string(), 1);
            }
        }
    }

    pub fn get(&self, room_id: &str) -> u64 {
        self.0.get(room_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    /// Rooms with more than `threshold` rows, largest first, at most `limit` of them.
    /// Rows of every other room are summed into `others`.
    pub fn largest_rooms(&self, threshold: u64, limit: usize) -> RoomSizeReport {
        let mut big: Vec<RoomSize> = self
            .0
            .iter()
            .filter(|(_, rows)| **rows > threshold)
            .map(|(room_id, rows)| RoomSize {
                room_id: room_id.clone(),
                rows: *rows,
                name: None,
            })
            .collect();
        big.sort_by(|a, b| b.rows.cmp(&a.rows).then_with(|| a.room_id.cmp(&b.room_id)));
        big.truncate(limit);

        let total = self.total();
        let listed: u64 = big.iter().map(|room| room.rows).sum();
        RoomSizeReport {
            rooms: big,
            others: total - listed,
            total,
        }
    }

    /// Rows still present for each of `room_ids`, skipping rooms that are fully gone.
    pub fn remaining_rows<'a>(&self, room_ids: impl IntoIterator<Item = &'a str>) -> Vec<(String, u64)> {
        room_ids
            .into_iter()
            .filter_map(|room_id| {
                let rows = self.get(room_id);
                (rows > 0).then(|| (room_id.to_string(), rows))
            })
            .collect()
    }
}

impl FromIterator<(String, u64)> for RowCountByRoom {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Producer-side totals for a finished scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    pub delivered: u64,
    pub skipped: u64,
}

/// Starts scans against a [`StateStore`].
pub struct RowCountScanner {
    store: Arc<dyn StateStore>,
    settings: ScanSettings,
}

impl RowCountScanner {
    pub fn new(store: Arc<dyn StateStore>, settings: ScanSettings) -> Self {
        Self { store, settings }
    }

    /// Read the row estimate and spawn the producer. The returned stream must be
    /// drained or dropped; dropping it stops the producer.
    pub async fn start(&self, cancel: CancellationToken) -> Result<ScanStream, DbError> {
        let estimated_total = self.store.estimated_state_row_count().await?;
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let store = Arc::clone(&self.store);
        let producer_cancel = cancel.clone();

        let producer = tokio::spawn(async move {
            let mut summary = ScanSummary::default();
            let mut rows = store.state_rows();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = producer_cancel.cancelled() => break,
                    next = rows.next() => next,
                };
                let Some(result) = next else { break };
                match result {
                    Ok(row) => {
                        let sent = tokio::select! {
                            biased;
                            _ = producer_cancel.cancelled() => break,
                            sent = tx.send(row) => sent,
                        };
                        if sent.is_err() {
                            // Consumer went away.
                            break;
                        }
                        summary.delivered += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "error scanning a state_groups_state row");
                        summary.skipped += 1;
                    }
                }
            }
            summary
        });

        info!(estimated_total, "started state_groups_state scan");
        Ok(ScanStream {
            estimated_total,
            rows: rx,
            producer,
            settings: self.settings.clone(),
            cancel,
        })
    }
}

/// A running scan: the planner estimate and the bounded row stream.
pub struct ScanStream {
    pub estimated_total: i64,
    rows: mpsc::Receiver<StateRow>,
    producer: JoinHandle<ScanSummary>,
    settings: ScanSettings,
    cancel: CancellationToken,
}

impl ScanStream {
    /// Next row, or `None` once the producer has finished.
    pub async fn next_row(&mut self) -> Option<StateRow> {
        self.rows.recv().await
    }

    /// Wait for the producer once the rows have been read with [`next_row`](Self::next_row).
    pub async fn finish(self) -> Result<ScanSummary, JanitorError> {
        drop(self.rows);
        self.producer
            .await
            .map_err(|e| JanitorError::Task(TaskKind::Scan, e.to_string()))
    }

    /// Drain the stream into per-room counts, logging throttled progress.
    pub async fn collect_counts(mut self) -> Result<RowCountByRoom, JanitorError> {
        let mut counts = RowCountByRoom::new();
        let mut throttle = ProgressThrottle::new(
            self.settings.progress_every_rows,
            self.settings.progress_interval,
        );
        let mut scanned = 0u64;

        loop {
            let row = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(JanitorError::Cancelled),
                row = self.rows.recv() => row,
            };
            let Some(row) = row else { break };
            counts.add(&row.room_id);
            scanned += 1;
            if throttle.tick() {
                info!(
                    scanned,
                    estimated_total = self.estimated_total,
                    percent = estimate_percent(scanned, self.estimated_total),
                    "scanning state_groups_state"
                );
            }
        }

        match self.producer.await {
            Ok(summary) => info!(
                scanned,
                skipped = summary.skipped,
                rooms = counts.len(),
                "finished state_groups_state scan"
            ),
            Err(e) => warn!(error = %e, "scan producer task did not finish cleanly"),
        }
        Ok(counts)
    }
}
