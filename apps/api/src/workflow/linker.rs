//! Workflow linker: run identifiers and the artifacts published under them.
//!
//! A run artifact lives at `"{stage}_{id}"`. It is written once when its stage
//! completes, read by the next view (possibly repeatedly), never mutated, and
//! only removed by a stage-wide clear or by expiry.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::ExpiringStore;
use crate::store::KeyValueStore;
use crate::workflow::Stage;

/// Published runs must outlive a browsing session, so a day by default.
pub const DEFAULT_RUN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Opaque token linking a stage's output to the next view.
/// Formatted `{epoch_millis}-{seq}` so ids sort roughly by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Accepts an id coming back from a URL. Empty ids and ids containing
    /// whitespace cannot have been generated here.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct WorkflowLinker<S> {
    cache: Arc<ExpiringStore<S>>,
    run_ttl: Duration,
    seq: AtomicU32,
}

impl<S: KeyValueStore> WorkflowLinker<S> {
    pub fn new(cache: Arc<ExpiringStore<S>>, run_ttl: Duration) -> Self {
        // A random starting point keeps two processes started in the same
        // millisecond from handing out the same ids.
        let seed = Uuid::new_v4().as_u128() as u32;
        Self {
            run_ttl: run_ttl.max(cache.default_ttl()),
            cache,
            seq: AtomicU32::new(seed),
        }
    }

    pub fn run_ttl(&self) -> Duration {
        self.run_ttl
    }

    /// The storage key of a run artifact.
    pub fn key(stage: Stage, id: &RunId) -> String {
        format!("{}_{}", stage.as_str(), id)
    }

    /// Generates a fresh run id. Unique even when called twice in the same
    /// clock tick, thanks to the per-linker counter.
    pub fn begin_run(&self, stage: Stage) -> RunId {
        let millis = self.cache.clock().now_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = RunId(format!("{millis}-{seq:08x}"));
        debug!("Began {stage} run {id}");
        id
    }

    /// Stores `payload` as the artifact of `stage` for run `id`.
    /// Returns `false` if storage refused the write.
    pub fn publish<T: Serialize + ?Sized>(&self, stage: Stage, id: &RunId, payload: &T) -> bool {
        let key = Self::key(stage, id);
        let stored = self.cache.set_with_ttl(&key, payload, self.run_ttl);
        if stored {
            info!("Published {stage} run {id}");
        }
        stored
    }

    /// Looks the artifact up. Absent means invalid id, expired, or cleared;
    /// callers restart the workflow rather than fail.
    pub fn resolve(&self, stage: Stage, id: &RunId) -> Option<Value> {
        self.cache.get_value(&Self::key(stage, id))
    }

    /// Typed resolve. A payload that does not fit `T` is treated as absent
    /// and evicted.
    pub fn resolve_as<T: DeserializeOwned>(&self, stage: Stage, id: &RunId) -> Option<T> {
        self.cache.get(&Self::key(stage, id))
    }

    /// Attaches a side value (e.g. the target role) to a run.
    pub fn attach<T: Serialize + ?Sized>(&self, name: &str, id: &RunId, value: &T) -> bool {
        self.cache
            .set_with_ttl(&format!("{name}_{id}"), value, self.run_ttl)
    }

    pub fn attached<T: DeserializeOwned>(&self, name: &str, id: &RunId) -> Option<T> {
        self.cache.get(&format!("{name}_{id}"))
    }

    /// Drops every artifact of `stage`, from any run.
    pub fn clear_stage(&self, stage: Stage) -> usize {
        self.cache.clear_by_prefix(&stage.key_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::memory_cache;
    use crate::cache::DEFAULT_TTL;
    use crate::clock::{Clock, ManualClock};
    use crate::models::AnalyzeResponse;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::HashSet;

    fn linker() -> (WorkflowLinker<Arc<MemoryStore>>, Arc<MemoryStore>, ManualClock) {
        let (cache, raw, clock) = memory_cache();
        (WorkflowLinker::new(cache, DEFAULT_RUN_TTL), raw, clock)
    }

    #[test]
    fn test_resolve_before_publish_is_absent() {
        let (linker, _, _) = linker();
        let id = linker.begin_run(Stage::Analyze);
        assert!(linker.resolve(Stage::Analyze, &id).is_none());
    }

    #[test]
    fn test_publish_then_resolve_returns_payload() {
        let (linker, raw, _) = linker();
        let id = linker.begin_run(Stage::Analyze);
        let payload = json!({"summary": "ok", "match_score": 0.73});
        assert!(linker.publish(Stage::Analyze, &id, &payload));
        assert_eq!(linker.resolve(Stage::Analyze, &id), Some(payload.clone()));
        // Repeated reads are idempotent.
        assert_eq!(linker.resolve(Stage::Analyze, &id), Some(payload));
        assert!(raw.get(&format!("analyze_{id}")).unwrap().is_some());
    }

    #[test]
    fn test_resolve_as_types_payload_and_evicts_misfit() {
        let (linker, raw, _) = linker();
        let id = linker.begin_run(Stage::Analyze);
        linker.publish(Stage::Analyze, &id, &json!({"summary": "ok", "match_score": 0.73}));
        let typed: AnalyzeResponse = linker.resolve_as(Stage::Analyze, &id).unwrap();
        assert_eq!(typed.match_score, Some(0.73));

        let other = linker.begin_run(Stage::Analyze);
        linker.publish(Stage::Analyze, &other, &json!("just a string"));
        assert!(linker
            .resolve_as::<AnalyzeResponse>(Stage::Analyze, &other)
            .is_none());
        assert!(raw.get(&format!("analyze_{other}")).unwrap().is_none());
    }

    #[test]
    fn test_stages_do_not_share_keys() {
        let (linker, _, _) = linker();
        let id = linker.begin_run(Stage::Analyze);
        linker.publish(Stage::Analyze, &id, &json!(1));
        assert!(linker.resolve(Stage::Rewrite, &id).is_none());
    }

    #[test]
    fn test_ids_unique_within_one_tick() {
        let (linker, _, _) = linker();
        let ids: HashSet<_> = (0..1000).map(|_| linker.begin_run(Stage::Analyze)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_start_with_timestamp() {
        let (linker, _, clock) = linker();
        let id = linker.begin_run(Stage::Rewrite);
        assert!(id.as_str().starts_with(&clock.now_millis().to_string()));
    }

    #[test]
    fn test_run_outlives_default_cache_ttl() {
        let (linker, _, clock) = linker();
        let id = linker.begin_run(Stage::Analyze);
        linker.publish(Stage::Analyze, &id, &json!("kept"));
        clock.advance_minutes(8 * 60);
        assert!(linker.resolve(Stage::Analyze, &id).is_some());
        clock.advance_minutes(17 * 60);
        assert!(linker.resolve(Stage::Analyze, &id).is_none());
    }

    #[test]
    fn test_run_ttl_never_shorter_than_default() {
        let raw = Arc::new(MemoryStore::new());
        let cache = Arc::new(ExpiringStore::new(raw));
        let linker = WorkflowLinker::new(cache, Duration::from_secs(1));
        assert_eq!(linker.run_ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_clear_stage_keeps_other_stage() {
        let (linker, _, _) = linker();
        let a = linker.begin_run(Stage::Analyze);
        let r1 = linker.begin_run(Stage::Rewrite);
        let r2 = linker.begin_run(Stage::Rewrite);
        linker.publish(Stage::Analyze, &a, &json!("a"));
        linker.publish(Stage::Rewrite, &r1, &json!("r1"));
        linker.publish(Stage::Rewrite, &r2, &json!("r2"));

        assert_eq!(linker.clear_stage(Stage::Rewrite), 2);
        assert!(linker.resolve(Stage::Rewrite, &r1).is_none());
        assert!(linker.resolve(Stage::Rewrite, &r2).is_none());
        assert_eq!(linker.resolve(Stage::Analyze, &a), Some(json!("a")));
    }

    #[test]
    fn test_attached_values_follow_run() {
        let (linker, _, _) = linker();
        let id = linker.begin_run(Stage::Analyze);
        linker.attach("target_role", &id, "Backend Engineer");
        assert_eq!(
            linker.attached::<String>("target_role", &id).as_deref(),
            Some("Backend Engineer")
        );
    }

    #[test]
    fn test_run_id_parse() {
        assert!(RunId::parse("").is_none());
        assert!(RunId::parse("12 34").is_none());
        assert_eq!(RunId::parse(" 1700-0a ").unwrap().as_str(), "1700-0a");
    }
}
