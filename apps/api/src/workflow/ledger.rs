//! Score history ledger: the last 20 match scores, oldest first, for trend charts.
//!
//! Stored unwrapped (no TTL envelope) under `analysis_history`. The
//! read-modify-write in `record` is not atomic across processes sharing the
//! namespace: two concurrent writers can lose one entry. Accepted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::ExpiringStore;
use crate::clock::EpochMillis;
use crate::store::KeyValueStore;

pub const HISTORY_KEY: &str = "analysis_history";
pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "ts")]
    pub timestamp: EpochMillis,
    pub score: f64,
}

impl HistoryEntry {
    /// Score as a whole percentage. Scores up to 1.0 are fractions.
    pub fn percent(&self) -> u32 {
        let pct = if self.score <= 1.0 {
            self.score * 100.0
        } else {
            self.score
        };
        pct.round().clamp(0.0, 100.0) as u32
    }
}

/// One point of the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: EpochMillis,
    pub percent: u32,
}

pub struct ScoreLedger<S> {
    cache: Arc<ExpiringStore<S>>,
}

impl<S: KeyValueStore> ScoreLedger<S> {
    pub fn new(cache: Arc<ExpiringStore<S>>) -> Self {
        Self { cache }
    }

    /// Appends `score` stamped with the current time, keeping the newest 20.
    /// Non-finite scores are refused; they would not survive JSON.
    pub fn record(&self, score: f64) -> bool {
        if !score.is_finite() {
            warn!("Refusing to record non-finite score {score}");
            return false;
        }

        let mut history = self.read();
        history.push(HistoryEntry {
            timestamp: self.cache.clock().now_millis(),
            score,
        });
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }

        let raw = match serde_json::to_string(&history) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Score history not serializable: {e}");
                return false;
            }
        };
        match self.cache.raw().set(HISTORY_KEY, &raw) {
            Ok(()) => {
                debug!("Recorded score {score} ({} in history)", history.len());
                true
            }
            Err(e) => {
                warn!("Score history write failed, trend not updated: {e}");
                false
            }
        }
    }

    /// Records only when there is a score. Analyses without a job
    /// description have none and must not show up in the trend.
    pub fn record_optional(&self, score: Option<f64>) -> bool {
        match score {
            Some(score) => self.record(score),
            None => false,
        }
    }

    /// The persisted history, oldest first. Missing or corrupt data reads as empty.
    pub fn read(&self) -> Vec<HistoryEntry> {
        let raw = match self.cache.raw().get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Score history read failed: {e}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!("Score history unreadable, treating as empty: {e}");
            Vec::new()
        })
    }

    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.read()
            .iter()
            .map(|e| ChartPoint {
                timestamp: e.timestamp,
                percent: e.percent(),
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Err(e) = self.cache.raw().remove(HISTORY_KEY) {
            warn!("Score history clear failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::memory_cache;
    use crate::clock::{Clock, ManualClock};
    use crate::store::MemoryStore;

    fn ledger() -> (ScoreLedger<Arc<MemoryStore>>, Arc<MemoryStore>, ManualClock) {
        let (cache, raw, clock) = memory_cache();
        (ScoreLedger::new(cache), raw, clock)
    }

    #[test]
    fn test_empty_when_nothing_recorded() {
        let (ledger, _, _) = ledger();
        assert!(ledger.read().is_empty());
    }

    #[test]
    fn test_record_appends_with_timestamp() {
        let (ledger, _, clock) = ledger();
        assert!(ledger.record(0.73));
        let history = ledger.read();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 0.73);
        assert_eq!(history[0].timestamp, clock.now_millis());
    }

    #[test]
    fn test_keeps_last_twenty_oldest_first() {
        let (ledger, _, clock) = ledger();
        for i in 0..25 {
            ledger.record(i as f64 / 100.0);
            clock.advance_millis(1);
        }
        let history = ledger.read();
        assert_eq!(history.len(), HISTORY_LIMIT);
        let scores: Vec<f64> = history.iter().map(|e| e.score).collect();
        let expected: Vec<f64> = (5..25).map(|i| i as f64 / 100.0).collect();
        assert_eq!(scores, expected);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_none_score_is_not_recorded() {
        let (ledger, raw, _) = ledger();
        assert!(!ledger.record_optional(None));
        assert!(raw.get(HISTORY_KEY).unwrap().is_none());
    }

    #[test]
    fn test_nan_is_refused() {
        let (ledger, _, _) = ledger();
        assert!(!ledger.record(f64::NAN));
        assert!(ledger.read().is_empty());
    }

    #[test]
    fn test_corrupt_history_reads_empty_and_is_replaced() {
        let (ledger, raw, _) = ledger();
        raw.set(HISTORY_KEY, "{\"oops\":").unwrap();
        assert!(ledger.read().is_empty());
        ledger.record(0.5);
        assert_eq!(ledger.read().len(), 1);
    }

    #[test]
    fn test_legacy_ts_field_is_read() {
        let (ledger, raw, _) = ledger();
        raw.set(HISTORY_KEY, r#"[{"ts": 1000, "score": 0.4}]"#).unwrap();
        assert_eq!(
            ledger.read(),
            vec![HistoryEntry {
                timestamp: 1000,
                score: 0.4
            }]
        );
    }

    #[test]
    fn test_history_is_not_envelope_wrapped() {
        let (ledger, raw, _) = ledger();
        ledger.record(0.9);
        let stored = raw.get(HISTORY_KEY).unwrap().unwrap();
        assert!(stored.starts_with('['));
    }

    #[test]
    fn test_percent_handles_both_scales() {
        let frac = HistoryEntry {
            timestamp: 0,
            score: 0.734,
        };
        let pct = HistoryEntry {
            timestamp: 0,
            score: 82.0,
        };
        assert_eq!(frac.percent(), 73);
        assert_eq!(pct.percent(), 82);
    }

    #[test]
    fn test_chart_points_follow_history() {
        let (ledger, _, _) = ledger();
        ledger.record(0.5);
        ledger.record(0.75);
        let points: Vec<u32> = ledger.chart_points().iter().map(|p| p.percent).collect();
        assert_eq!(points, vec![50, 75]);
    }

    #[test]
    fn test_clear_removes_history() {
        let (ledger, _, _) = ledger();
        ledger.record(0.5);
        ledger.clear();
        assert!(ledger.read().is_empty());
    }
}
