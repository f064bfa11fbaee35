use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    status::{build_status_text, StatusSink},
    storage::entities::KeystrokeAggregate,
    sync::RefreshRequest,
    utils::clock::Clock,
};

use super::aggregator::SessionAggregator;

/// Everything the host editor (and the sync manager) can ask of the tracker.
/// All of it funnels through one channel so summary mutation stays
/// single-writer.
#[derive(Debug)]
pub enum TrackerEvent {
    /// A flush of accumulated edit counts from the event watcher.
    Flush(KeystrokeAggregate),
    /// The editor was focused and active for another chunk of real time.
    WallClockTick { seconds: u64 },
    /// Collaborative-session minutes reported by the liveshare integration.
    LiveshareMinutes(f64),
    /// A summary fetched from the server, to be merged into local state.
    ServerSummary(serde_json::Value),
    /// Redraw the status bar from current state, e.g. on window focus.
    RefreshStatus,
}

/// Single-writer event loop around the [SessionAggregator]. Detects calendar
/// day changes between events and rolls the counters over before applying
/// the next one.
pub struct TrackerModule {
    receiver: mpsc::Receiver<TrackerEvent>,
    aggregator: SessionAggregator,
    status: Box<dyn StatusSink>,
    refresh_requests: mpsc::Sender<RefreshRequest>,
    clock: Box<dyn Clock>,
    current_day: NaiveDate,
}

impl TrackerModule {
    pub fn new(
        receiver: mpsc::Receiver<TrackerEvent>,
        aggregator: SessionAggregator,
        status: Box<dyn StatusSink>,
        refresh_requests: mpsc::Sender<RefreshRequest>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let current_day = clock.today();
        Self {
            receiver,
            aggregator,
            status,
            refresh_requests,
            clock,
            current_day,
        }
    }

    /// Executes the tracker event loop until every sender is dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Processing event {:?}", event);
            self.check_day_rollover().await;
            self.process(event).await;
        }
        self.receiver.close();
        Ok(())
    }

    async fn check_day_rollover(&mut self) {
        let today = self.clock.today();
        if today != self.current_day {
            info!(
                "Calendar day changed from {} to {}, rolling daily counters over",
                self.current_day, today
            );
            self.aggregator.roll_over_day().await;
            self.current_day = today;
            // the new day's average comes from the server
            self.request_refresh();
        }
    }

    async fn process(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Flush(aggregate) => {
                let outcome = self.aggregator.increment_session(&aggregate).await;
                if outcome.needs_server_refresh {
                    self.request_refresh();
                }
                self.refresh_status().await;
            }
            TrackerEvent::WallClockTick { seconds } => {
                self.aggregator.wall_clock().record_active_seconds(seconds);
                self.refresh_status().await;
            }
            TrackerEvent::LiveshareMinutes(minutes) => {
                self.aggregator.set_liveshare_minutes(minutes).await;
            }
            TrackerEvent::ServerSummary(summary) => {
                self.aggregator
                    .summary_store()
                    .apply_server_update(&summary)
                    .await;
                self.refresh_status().await;
            }
            TrackerEvent::RefreshStatus => self.refresh_status().await,
        }
    }

    async fn refresh_status(&mut self) {
        let summary = self.aggregator.current_summary().await;
        let wc_time = self.aggregator.wall_clock().humanized();
        let status = build_status_text(&summary, &wc_time);
        self.status.show_status(&status.text, &status.tooltip);
    }

    fn request_refresh(&self) {
        // Best effort. A full queue means a refresh is already pending.
        if let Err(e) = self.refresh_requests.try_send(RefreshRequest) {
            debug!("Skipping server refresh request: {e}");
        }
    }
}
