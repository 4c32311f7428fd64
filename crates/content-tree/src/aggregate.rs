//! `totalTime` maintenance on the timing owner (term or course).

use crate::duration::parse_minutes;
use crate::path::{ChapterParent, DocPath};
use crate::store::{EntityStore, StoreResult};
use serde_json::{json, Value};

pub(crate) const TOTAL_TIME: &str = "totalTime";

pub struct Aggregator<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Add a new content item's minutes. Returns the new total.
    pub fn record_created(&self, owner: &DocPath, timeframe: &str) -> StoreResult<i64> {
        let minutes = i64::from(parse_minutes(timeframe));
        self.store.adjust_counter(owner, TOTAL_TIME, minutes)
    }

    /// Remove a deleted item's minutes, never going below zero.
    pub fn record_deleted(&self, owner: &DocPath, timeframe: &str) -> StoreResult<i64> {
        let minutes = i64::from(parse_minutes(timeframe));
        self.store.adjust_counter(owner, TOTAL_TIME, -minutes)
    }

    /// Current total; zero when the field or document is missing.
    pub fn total(&self, owner: &DocPath) -> StoreResult<i64> {
        Ok(self
            .store
            .get(owner)?
            .and_then(|doc| doc.data.get(TOTAL_TIME).and_then(Value::as_i64))
            .unwrap_or(0))
    }

    /// Recompute the total from every content item under `parent`.
    pub fn rebuild(&self, parent: &ChapterParent) -> StoreResult<i64> {
        let mut total = 0i64;
        for chapter in self.store.list(&parent.chapters())? {
            for content in self.store.list(&parent.contents(chapter.id()))? {
                let timeframe = content.data.get("timeframe").and_then(Value::as_str).unwrap_or("");
                total += i64::from(parse_minutes(timeframe));
            }
        }
        self.store.update(&parent.timing_owner(), json!({ TOTAL_TIME: total }))?;
        tracing::info!(owner = %parent.timing_owner(), total, "rebuilt total time");
        Ok(total)
    }
}
