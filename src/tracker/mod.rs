//! The tracking engine.
//! The basic idea is:
//!  - The host editor pushes [TrackerEvent]s into one channel.
//!  - [module::TrackerModule] applies them to the [aggregator::SessionAggregator]
//!    one at a time, so the daily summary has exactly one writer.
//!  - [crate::sync::SyncManager] runs beside it and feeds fetched server
//!    summaries back through the same channel.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    status::StatusSink,
    storage::{
        kv::{into_shared, JsonKvStore},
        summary::SummaryStore,
        time_data::TimeDataStore,
    },
    sync::{api::SummaryApi, SyncManager},
    utils::clock::Clock,
};

pub mod aggregator;
pub mod module;
pub mod wall_clock;

pub use aggregator::{AggregatorConfig, PrimaryToken};
pub use module::TrackerEvent;

use aggregator::SessionAggregator;
use module::TrackerModule;
use wall_clock::WallClockTracker;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 30);
const EVENT_QUEUE_SIZE: usize = 16;
const REFRESH_QUEUE_SIZE: usize = 4;

/// Wires stores, aggregator, event loop and sync manager together.
/// The host keeps the [Self::handle] sender and awaits [Self::run].
pub struct TrackerRuntime {
    events: mpsc::Sender<TrackerEvent>,
    module: TrackerModule,
    sync: SyncManager,
}

impl TrackerRuntime {
    pub fn new(
        dir: PathBuf,
        token: PrimaryToken,
        api: Box<dyn SummaryApi>,
        status: Box<dyn StatusSink>,
        shutdown: CancellationToken,
        clock: impl Clock + Clone,
        config: AggregatorConfig,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_SIZE);

        let aggregator = create_aggregator(&dir, token, clock.clone(), config);
        let module = TrackerModule::new(
            events_rx,
            aggregator,
            status,
            refresh_tx,
            Box::new(clock.clone()),
        );
        let sync = SyncManager::new(
            api,
            DEFAULT_SYNC_INTERVAL,
            refresh_rx,
            events_tx.clone(),
            shutdown,
            Box::new(clock),
        );

        Ok(Self {
            events: events_tx,
            module,
            sync,
        })
    }

    /// Sender the host event watcher pushes into. The runtime stops once the
    /// shutdown token fires and every handle is dropped.
    pub fn handle(&self) -> mpsc::Sender<TrackerEvent> {
        self.events.clone()
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            events,
            module,
            sync,
        } = self;
        // only host-held handles should keep the loop alive
        drop(events);

        let (module_result, sync_result) = tokio::join!(module.run(), sync.run());

        if let Err(e) = &module_result {
            error!("Tracker module got an error {:?}", e);
        }
        if let Err(e) = &sync_result {
            error!("Sync manager got an error {:?}", e);
        }

        module_result.and(sync_result)
    }
}

fn create_aggregator(
    dir: &std::path::Path,
    token: PrimaryToken,
    clock: impl Clock,
    config: AggregatorConfig,
) -> SessionAggregator {
    let kv = into_shared(JsonKvStore::load(dir));
    SessionAggregator::new(
        token,
        SummaryStore::new(dir),
        TimeDataStore::new(dir),
        WallClockTracker::new(kv.clone()),
        kv,
        Box::new(clock),
        config,
    )
}

#[cfg(test)]
mod tracker_tests {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::{
        status::MockStatusSink,
        storage::entities::{KeystrokeAggregate, SessionSummary, TimeData},
        sync::api::MockSummaryApi,
        utils::logging::TEST_LOGGING,
    };

    use super::*;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    /// Clock the test can move forward explicitly. Sleeps stall forever so
    /// the sync cadence never fires on its own.
    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        offset_seconds: Arc<AtomicI64>,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                start_time: Utc.from_utc_datetime(&TEST_START_DATE),
                offset_seconds: Arc::new(AtomicI64::new(0)),
            }
        }

        fn advance(&self, seconds: i64) {
            self.offset_seconds.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + ChronoDuration::seconds(self.offset_seconds.load(Ordering::SeqCst))
        }

        async fn sleep(&self, _duration: std::time::Duration) {
            std::future::pending::<()>().await;
        }
    }

    fn capturing_sink() -> (MockStatusSink, Arc<Mutex<Vec<(String, String)>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut sink = MockStatusSink::new();
        let sink_captured = captured.clone();
        sink.expect_show_status()
            .returning(move |text, tooltip| {
                sink_captured
                    .lock()
                    .unwrap()
                    .push((text.to_owned(), tooltip.to_owned()));
            });
        (sink, captured)
    }

    async fn wait_for(
        captured: &Arc<Mutex<Vec<(String, String)>>>,
        predicate: impl Fn(&[(String, String)]) -> bool,
    ) {
        for _ in 0..250 {
            if predicate(&captured.lock().unwrap()) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("status sink never saw the expected update");
    }

    /// End to end: flushes, a wall clock tick, a liveshare update and the
    /// deferred first-flush server sync, verified against the on-disk state.
    #[tokio::test]
    async fn smoke_test_tracker() -> anyhow::Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = TestClock::new();

        let mut api = MockSummaryApi::new();
        api.expect_fetch_session_summary()
            .returning(|| Ok(json!({ "averageDailyMinutes": 100.0 })));

        let (sink, captured) = capturing_sink();

        let shutdown = CancellationToken::new();
        let runtime = TrackerRuntime::new(
            dir.path().to_path_buf(),
            PrimaryToken::assume_primary(),
            Box::new(api),
            Box::new(sink),
            shutdown.clone(),
            clock.clone(),
            AggregatorConfig::default(),
        )?;
        let handle = runtime.handle();
        let run = tokio::spawn(runtime.run());

        handle
            .send(TrackerEvent::Flush(KeystrokeAggregate {
                keystrokes: 10,
                lines_added: 4,
                lines_removed: 1,
            }))
            .await?;
        handle
            .send(TrackerEvent::Flush(KeystrokeAggregate {
                keystrokes: 7,
                lines_added: 1,
                lines_removed: 3,
            }))
            .await?;
        handle.send(TrackerEvent::WallClockTick { seconds: 30 }).await?;
        handle.send(TrackerEvent::LiveshareMinutes(3.5)).await?;

        // the first flush schedules a deferred server fetch; wait for its
        // average to show up in a status refresh
        wait_for(&captured, |updates| {
            updates.iter().any(|(_, tooltip)| tooltip.contains("average 100 min"))
        })
        .await;

        shutdown.cancel();
        drop(handle);
        run.await??;

        let mut summary_store = SummaryStore::new(dir.path());
        let summary = summary_store.get().await;
        assert_eq!(
            summary,
            SessionSummary {
                current_day_minutes: 2.0,
                average_daily_minutes: 100.0,
                current_day_keystrokes: 17,
                current_day_lines_added: 5,
                current_day_lines_removed: 4,
                liveshare_minutes: 3.5,
                ..Default::default()
            }
        );

        // flush1 bumped the wall clock to 61, flush2 to 121, the tick adds 30
        let kv = JsonKvStore::load(dir.path());
        let wall_clock = WallClockTracker::new(into_shared(kv));
        assert_eq!(wall_clock.time_in_seconds(), 151);

        let bucket = TimeDataStore::new(dir.path())
            .data_for(clock.today())
            .await
            .unwrap();
        assert_eq!(
            bucket,
            TimeData {
                editor_seconds: 121,
                session_seconds: 120,
                file_seconds: 120,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn day_change_rolls_counters_over() -> anyhow::Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let clock = TestClock::new();

        let mut api = MockSummaryApi::new();
        api.expect_fetch_session_summary()
            .returning(|| Ok(json!({ "averageDailyMinutes": 100.0 })));

        let (sink, captured) = capturing_sink();

        let shutdown = CancellationToken::new();
        let runtime = TrackerRuntime::new(
            dir.path().to_path_buf(),
            PrimaryToken::assume_primary(),
            Box::new(api),
            Box::new(sink),
            shutdown.clone(),
            clock.clone(),
            AggregatorConfig::default(),
        )?;
        let handle = runtime.handle();
        let run = tokio::spawn(runtime.run());

        handle
            .send(TrackerEvent::Flush(KeystrokeAggregate {
                keystrokes: 100,
                lines_added: 10,
                lines_removed: 5,
            }))
            .await?;
        wait_for(&captured, |updates| !updates.is_empty()).await;
        let first_day = clock.today();

        clock.advance(60 * 60 * 24);
        let update_count = captured.lock().unwrap().len();
        handle.send(TrackerEvent::RefreshStatus).await?;
        wait_for(&captured, |updates| updates.len() > update_count).await;

        shutdown.cancel();
        drop(handle);
        run.await??;

        let mut summary_store = SummaryStore::new(dir.path());
        let summary = summary_store.get().await;
        assert_eq!(summary.current_day_minutes, 0.0);
        assert_eq!(summary.current_day_keystrokes, 0);

        let kv = JsonKvStore::load(dir.path());
        let wall_clock = WallClockTracker::new(into_shared(kv));
        assert_eq!(wall_clock.time_in_seconds(), 0);

        // the first day's bucket survives rollover
        let bucket = TimeDataStore::new(dir.path()).data_for(first_day).await;
        assert_eq!(
            bucket,
            Some(TimeData {
                editor_seconds: 61,
                session_seconds: 60,
                file_seconds: 60,
            })
        );

        Ok(())
    }
}
