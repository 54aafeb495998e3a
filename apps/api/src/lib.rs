//! resumeflow: the workflow cache behind a résumé analyze/optimize flow.
//!
//! Views are loaded independently and share nothing but a key/value
//! namespace. This crate provides that namespace (`store`), TTL envelopes
//! over it (`cache`), content fingerprints for dedup (`fingerprint`), the
//! run linkage and score ledger (`workflow`), the backend boundary
//! (`boundary`), and a stateless HTTP proxy in front of the backend (`routes`).

pub mod boundary;
pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod workflow;

use std::sync::Arc;

use anyhow::Result;

use crate::boundary::BackendClient;
use crate::cache::ExpiringStore;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::store::FileStore;
use crate::workflow::Workflow;

/// A workflow over the persistent file namespace, talking to the configured backend.
///
/// This is the entry point for the view layer that drives the pages. The
/// HTTP binary does not hold workflows; it only serves the stateless proxy.
pub fn open_workflow(config: &Config) -> Result<Workflow<FileStore, BackendClient>> {
    let store = FileStore::open(&config.store_path)?;
    let cache = Arc::new(ExpiringStore::with_clock(
        store,
        Arc::new(SystemClock),
        config.cache_ttl(),
    ));
    let backend = BackendClient::new(config.backend_url.clone())?;
    Ok(Workflow::new(cache, backend, config.run_ttl()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Stage, WorkflowState};
    use serde_json::json;

    #[test]
    fn test_open_workflow_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            store_path: dir.path().join("store.json"),
            ..Config::default()
        };

        let first = open_workflow(&config).unwrap();
        assert_eq!(first.state(), WorkflowState::Idle);
        let run = first.linker().begin_run(Stage::Analyze);
        assert!(first
            .linker()
            .publish(Stage::Analyze, &run, &json!({"match_score": 0.73})));
        assert!(first.ledger().record(0.73));
        drop(first);

        // A fresh instance is what the next page load sees.
        let second = open_workflow(&config).unwrap();
        let view = second.open_analysis(run.as_str()).unwrap();
        assert_eq!(view.analysis["match_score"], 0.73);
        assert_eq!(view.history.len(), 1);
    }
}
