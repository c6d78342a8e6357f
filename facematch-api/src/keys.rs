use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub trait TimeSource {
    /// Milliseconds since the unix epoch.
    fn current_millis(&self) -> i64;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_millis(&self) -> i64 {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();

        i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
    }
}

/// Generates object keys of the form `target-<unix-millis>.jpg`.
///
/// Keys are strictly increasing within a process: when two uploads land in the same
/// millisecond (or the clock steps back) the later one is bumped past the previous key.
pub struct TargetKeyGenerator {
    timesource: Arc<dyn TimeSource + Send + Sync>,
    last_millis: AtomicI64,
}

impl TargetKeyGenerator {
    pub fn new<T: TimeSource + Send + Sync + 'static>(timesource: T) -> Self {
        Self {
            timesource: Arc::new(timesource),
            last_millis: AtomicI64::new(i64::MIN),
        }
    }

    pub fn next_key(&self) -> String {
        let now = self.timesource.current_millis();

        let previous = self
            .last_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        let millis = now.max(previous.saturating_add(1));

        format!("target-{millis}.jpg")
    }
}
