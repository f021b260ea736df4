use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out report ids that are unique and increase with creation time.
///
/// Ids are millisecond timestamps, bumped past the previous id when two
/// reports land in the same tick or the clock steps backwards.
#[derive(Debug)]
pub struct ReportIdAllocator {
    last: AtomicI64,
}

impl ReportIdAllocator {
    /// `seed` is the highest id already in the store, if any.
    pub fn new(seed: Option<i64>) -> Self {
        Self {
            last: AtomicI64::new(seed.unwrap_or(0)),
        }
    }

    pub fn next(&self) -> i64 {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn next_at(&self, now_millis: i64) -> i64 {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_millis.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now_millis.max(previous + 1)
    }
}
