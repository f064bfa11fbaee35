//! Periodic reconciliation with the remote summary service. The server is
//! authoritative for rolling averages, the local store for today's running
//! counters, so fetched summaries are handed to the tracker loop instead of
//! being written here: the loop is the only writer of the summary file.
//! Any failure is logged and ignored; local data stays authoritative until
//! the next successful sync.

pub mod api;

use std::time::Duration;

use anyhow::Result;
use api::SummaryApi;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{tracker::module::TrackerEvent, utils::clock::Clock};

/// Ask the sync manager for an out-of-cadence fetch (first flush of a fresh
/// install, day rollover).
#[derive(Debug)]
pub struct RefreshRequest;

pub struct SyncManager {
    api: Box<dyn SummaryApi>,
    sync_interval: Duration,
    refresh_requests: mpsc::Receiver<RefreshRequest>,
    events: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl SyncManager {
    pub fn new(
        api: Box<dyn SummaryApi>,
        sync_interval: Duration,
        refresh_requests: mpsc::Receiver<RefreshRequest>,
        events: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            api,
            sync_interval,
            refresh_requests,
            events,
            shutdown,
            clock,
        }
    }

    /// Executes the sync event loop: one fetch per interval plus one per
    /// refresh request, until cancelled.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(());
                }
                _ = self.clock.sleep(self.sync_interval) => {}
                request = self.refresh_requests.recv() => {
                    if request.is_none() {
                        // tracker loop is gone, nobody left to sync for
                        return Ok(());
                    }
                }
            }

            self.refresh_once().await;
        }
    }

    async fn refresh_once(&mut self) {
        match self.api.fetch_session_summary().await {
            Ok(summary) => {
                debug!("Fetched server session summary");
                if self
                    .events
                    .send(TrackerEvent::ServerSummary(summary))
                    .await
                    .is_err()
                {
                    debug!("Tracker loop is gone, dropping server summary");
                }
            }
            Err(e) => {
                // No retry beyond the normal cadence.
                warn!("Session summary sync failed, keeping local data: {e:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use crate::sync::api::MockSummaryApi;

    use super::*;

    /// Clock whose sleeps never complete, so only refresh requests and
    /// cancellation can wake the loop.
    struct StalledClock;

    #[async_trait]
    impl Clock for StalledClock {
        fn time(&self) -> DateTime<Utc> {
            Utc::now()
        }

        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }

    fn manager(
        api: MockSummaryApi,
        shutdown: &CancellationToken,
    ) -> (
        SyncManager,
        mpsc::Sender<RefreshRequest>,
        mpsc::Receiver<TrackerEvent>,
    ) {
        let (refresh_tx, refresh_rx) = mpsc::channel(4);
        let (events_tx, events_rx) = mpsc::channel(4);
        let manager = SyncManager::new(
            Box::new(api),
            Duration::from_secs(3600),
            refresh_rx,
            events_tx,
            shutdown.clone(),
            Box::new(StalledClock),
        );
        (manager, refresh_tx, events_rx)
    }

    #[tokio::test]
    async fn refresh_request_forwards_server_summary() {
        let mut api = MockSummaryApi::new();
        api.expect_fetch_session_summary()
            .times(1)
            .returning(|| Ok(json!({ "averageDailyMinutes": 42.0 })));

        let shutdown = CancellationToken::new();
        let (manager, refresh_tx, mut events_rx) = manager(api, &shutdown);

        refresh_tx.send(RefreshRequest).await.unwrap();
        // dropping the requester ends the loop after the one refresh
        drop(refresh_tx);
        manager.run().await.unwrap();

        match events_rx.recv().await {
            Some(TrackerEvent::ServerSummary(value)) => {
                assert_eq!(value["averageDailyMinutes"], json!(42.0));
            }
            other => panic!("expected a server summary event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_swallowed() {
        let mut api = MockSummaryApi::new();
        api.expect_fetch_session_summary()
            .times(1)
            .returning(|| Err(anyhow!("network down")));

        let shutdown = CancellationToken::new();
        let (manager, refresh_tx, mut events_rx) = manager(api, &shutdown);

        refresh_tx.send(RefreshRequest).await.unwrap();
        drop(refresh_tx);
        // the failed fetch produces no event and doesn't kill the loop
        manager.run().await.unwrap();
        assert!(events_rx.recv().await.is_none());
    }
}
