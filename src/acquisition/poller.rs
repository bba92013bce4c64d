// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-bpm-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Trigger poller
//!
//! Every tick the poller asks the board whether a trigger frame is complete.
//! On a complete frame it latches the raw timestamp, notifies the subscribers
//! with the cycle time and re-arms the board's capture marker for the next
//! cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info};
use tokio::sync::broadcast;
use tokio::task;
use tokio::time::{self, MissedTickBehavior};

use super::timestamp::{Timestamp, TimestampLatch};
use crate::board::AcquisitionBoard;

/// Capacity of the trigger-ready notification channel
const NOTIFY_CAPACITY: usize = 64;

pub struct TriggerPoller {
    board: Arc<dyn AcquisitionBoard>,
    latch: Arc<TimestampLatch>,
    notifier: broadcast::Sender<Timestamp>,
    interval: Duration,
}

impl TriggerPoller {
    pub fn new(board: Arc<dyn AcquisitionBoard>, latch: Arc<TimestampLatch>, interval: Duration) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            board,
            latch,
            notifier,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Receiver of the trigger-ready notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Timestamp> {
        self.notifier.subscribe()
    }

    /// One poll cycle, returns the cycle timestamp when a frame was ready
    pub fn poll_once(&self) -> Option<Timestamp> {
        if !self.board.is_trigger_data_ready() {
            return None;
        }

        let raw = self.board.raw_timestamp();
        self.latch.store(raw);
        let timestamp = Timestamp::from_raw(raw);

        if self.notifier.send(timestamp).is_err() {
            debug!("Trigger ready, no subscriber");
        }

        self.board.latch_capture_marker();
        Some(timestamp)
    }

    /// Poll until `running` is cleared
    ///
    /// Board calls may block, so each cycle runs on the blocking thread pool.
    pub async fn run(self: Arc<Self>, running: Arc<AtomicBool>) -> Result<()> {
        info!("Trigger poller started, interval {:?}", self.interval);

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;

            let poller = self.clone();
            match task::spawn_blocking(move || poller.poll_once()).await {
                Ok(Some(ts)) => debug!("Trigger cycle {}.{:09}", ts.seconds, ts.nanoseconds),
                Ok(None) => debug!("Trigger frame not ready"),
                Err(e) => error!("Trigger poll failed: {}", e),
            }
        }

        info!("Trigger poller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{MockAcquisitionBoard, RawTimestamp, SimulatedBoard};
    use mockall::Sequence;

    #[test]
    fn test_cycle_order() {
        let mut board = MockAcquisitionBoard::new();
        let mut seq = Sequence::new();
        board
            .expect_is_trigger_data_ready()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);
        board
            .expect_raw_timestamp()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(RawTimestamp {
                tai_seconds: 631_152_000 + 28_800 + 10,
                tai_ticks: 1,
            });
        board
            .expect_latch_capture_marker()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let latch = Arc::new(TimestampLatch::new());
        let poller = TriggerPoller::new(Arc::new(board), latch.clone(), Duration::from_millis(100));
        let mut rx = poller.subscribe();

        let ts = poller.poll_once().unwrap();
        assert_eq!((ts.seconds, ts.nanoseconds), (10, 16));
        assert_eq!(latch.latest(), ts);
        assert_eq!(rx.try_recv().unwrap(), ts);
    }

    #[test]
    fn test_frame_not_ready() {
        let mut board = MockAcquisitionBoard::new();
        board.expect_is_trigger_data_ready().return_const(false);
        board.expect_raw_timestamp().never();
        board.expect_latch_capture_marker().never();

        let poller = TriggerPoller::new(
            Arc::new(board),
            Arc::new(TimestampLatch::new()),
            Duration::from_millis(100),
        );
        assert!(poller.poll_once().is_none());
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let board = Arc::new(SimulatedBoard::default());
        let poller = Arc::new(TriggerPoller::new(
            board.clone(),
            Arc::new(TimestampLatch::new()),
            Duration::from_millis(5),
        ));
        let mut rx = poller.subscribe();
        let running = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(poller.clone().run(running.clone()));

        let first = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(second > first);

        running.store(false, Ordering::SeqCst);
        handle.await.unwrap().unwrap();
        assert!(board.stats().capture_markers >= 2);
    }
}
