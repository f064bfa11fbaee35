use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Represents an entity responsible for providing dates across the
/// application. Injected everywhere time matters so that tests can warp it.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    /// Current time as epoch seconds. Payload gap math works in these.
    fn epoch_seconds(&self) -> i64 {
        self.time().timestamp()
    }

    /// Calendar day the tracker should attribute activity to.
    fn today(&self) -> NaiveDate {
        self.time().date_naive()
    }

    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy)]
pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
