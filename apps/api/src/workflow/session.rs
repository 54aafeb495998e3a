//! Pipeline driver: upload → analyze → (optimize) → rewrite.
//!
//! Each view is loaded independently, so nothing here lives longer than a
//! call except what goes through the store. The driver keeps the in-memory
//! state machine of the current view, refuses re-submission while a backend
//! call is pending, and drops results whose issuing view was abandoned.
//!
//! ```text
//! Idle ──submit──▶ Analyzing ──ok──▶ Analyzed ──optimize──▶ Rewriting ──ok──▶ Rewritten
//!   ▲                  │ err                        │ err
//!   │                  ▼                            ▼
//!   │               (prior)                     Analyzed
//!   └──────────── resolve finds nothing (any state)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::boundary::AnalysisBoundary;
use crate::cache::ExpiringStore;
use crate::errors::WorkflowError;
use crate::fingerprint::fingerprint;
use crate::models::{DocumentUpload, StoredDocument};
use crate::store::KeyValueStore;
use crate::workflow::ledger::{HistoryEntry, ScoreLedger};
use crate::workflow::linker::{RunId, WorkflowLinker};
use crate::workflow::Stage;

pub const TARGET_ROLE_KEY: &str = "target_role";
/// The uploaded document, attached to its analysis run as `resume_file_{id}`.
pub const DOCUMENT_KEY: &str = "resume_file";
/// Single-slot document keys written by older clients. Read-only fallback.
pub const LEGACY_DOCUMENT_NAME_KEY: &str = "resume_file_name";
pub const LEGACY_DOCUMENT_DATA_KEY: &str = "resume_file_data";
/// Prefix of content-addressed results, `fingerprint_{stage}_{digest}`.
pub const FINGERPRINT_PREFIX: &str = "fingerprint_";

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Analyzing,
    Analyzed { run: RunId },
    Rewriting { analysis: RunId },
    Rewritten { run: RunId },
}

#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub document: Option<DocumentUpload>,
    /// Only used when non-empty; otherwise the analysis has no match score.
    pub job_description: Option<String>,
    /// Remembered for the optimize action on the results view.
    pub target_role: Option<String>,
}

impl SubmitRequest {
    pub fn new(document: DocumentUpload) -> Self {
        Self {
            document: Some(document),
            ..Default::default()
        }
    }

    pub fn with_job_description(mut self, jd: impl Into<String>) -> Self {
        self.job_description = Some(jd.into());
        self
    }

    pub fn with_target_role(mut self, role: impl Into<String>) -> Self {
        self.target_role = Some(role.into());
        self
    }
}

/// A stage result that made it into the store (or would have, see `persisted`).
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub stage: Stage,
    pub run: RunId,
    pub payload: Value,
    /// `false` when storage refused the write. The payload is still valid for
    /// the current view, but a later view will have to start over.
    pub persisted: bool,
    /// Served from the fingerprint cache without calling the backend.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Published(Published),
    /// The issuing view went away while the backend was working. Nothing was stored.
    Abandoned,
}

impl Outcome {
    pub fn published(&self) -> Option<&Published> {
        match self {
            Outcome::Published(p) => Some(p),
            Outcome::Abandoned => None,
        }
    }
}

/// Everything the results view needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisView {
    pub run: RunId,
    pub analysis: Value,
    pub target_role: Option<String>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteView {
    pub run: RunId,
    pub rewrite: Value,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline driver
// ────────────────────────────────────────────────────────────────────────────

/// Released on drop so an early return or a failed call never leaves the
/// workflow stuck as busy.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, WorkflowError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Workflow<S, B> {
    cache: Arc<ExpiringStore<S>>,
    linker: WorkflowLinker<S>,
    ledger: ScoreLedger<S>,
    boundary: B,
    state: Mutex<WorkflowState>,
    in_flight: AtomicBool,
    /// Bumped whenever the current view is abandoned.
    epoch: AtomicU64,
}

impl<S: KeyValueStore, B: AnalysisBoundary> Workflow<S, B> {
    pub fn new(cache: Arc<ExpiringStore<S>>, boundary: B, run_ttl: Duration) -> Self {
        Self {
            linker: WorkflowLinker::new(cache.clone(), run_ttl),
            ledger: ScoreLedger::new(cache.clone()),
            cache,
            boundary,
            state: Mutex::new(WorkflowState::Idle),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn linker(&self) -> &WorkflowLinker<S> {
        &self.linker
    }

    pub fn ledger(&self) -> &ScoreLedger<S> {
        &self.ledger
    }

    pub fn state(&self) -> WorkflowState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn transition(&self, next: WorkflowState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!("Workflow {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// The current view is going away. Any pending backend result will be
    /// dropped instead of published.
    pub fn abandon(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Back to the upload page.
    pub fn restart(&self) {
        self.abandon();
        self.transition(WorkflowState::Idle);
    }

    fn restart_missing(&self, stage: Stage, id: &str) -> WorkflowError {
        warn!("No {stage} run for id '{id}', restarting workflow");
        self.transition(WorkflowState::Idle);
        WorkflowError::RunMissing {
            stage,
            id: id.to_string(),
        }
    }

    fn still_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Upload + optional job description → analysis run.
    ///
    /// Identical inputs within the cache TTL reuse the earlier analysis
    /// instead of calling the backend. Each submission still records a
    /// history point when there is a score.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Outcome, WorkflowError> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let document = request.document.ok_or(WorkflowError::DocumentMissing)?;
        let job_description = non_empty(request.job_description.as_deref());

        let epoch = self.epoch.load(Ordering::Acquire);
        let prior = self.state();
        self.transition(WorkflowState::Analyzing);

        let dedup_key = fingerprint_key(
            Stage::Analyze,
            &fingerprint(&document.bytes, job_description.unwrap_or("")),
        );
        let (payload, deduplicated) = match self.cache.get_value(&dedup_key) {
            Some(cached) => {
                debug!("Analysis served from fingerprint cache");
                (cached, true)
            }
            None => match self.boundary.analyze(&document, job_description).await {
                Ok(payload) => (payload, false),
                Err(e) => {
                    warn!("Analysis failed: {e}");
                    self.transition(prior);
                    return Err(e.into());
                }
            },
        };

        if !self.still_current(epoch) {
            info!("Analysis finished after its view was abandoned; dropping result");
            self.transition(prior);
            return Ok(Outcome::Abandoned);
        }

        if !deduplicated {
            self.cache.set(&dedup_key, &payload);
        }

        let run = self.linker.begin_run(Stage::Analyze);
        let persisted = self.linker.publish(Stage::Analyze, &run, &payload);
        self.remember_document(&run, &document);
        if let Some(role) = non_empty(request.target_role.as_deref()) {
            self.linker.attach(TARGET_ROLE_KEY, &run, role);
        }
        self.ledger.record_optional(match_score(&payload));

        self.transition(WorkflowState::Analyzed { run: run.clone() });
        Ok(Outcome::Published(Published {
            stage: Stage::Analyze,
            run,
            payload,
            persisted,
            deduplicated,
        }))
    }

    /// Loads the results view for an analysis run.
    pub fn open_analysis(&self, id: &str) -> Result<AnalysisView, WorkflowError> {
        let run = RunId::parse(id).ok_or_else(|| self.restart_missing(Stage::Analyze, id))?;
        let analysis = self
            .linker
            .resolve(Stage::Analyze, &run)
            .ok_or_else(|| self.restart_missing(Stage::Analyze, id))?;

        let target_role = self.linker.attached::<String>(TARGET_ROLE_KEY, &run);
        self.transition(WorkflowState::Analyzed { run: run.clone() });
        Ok(AnalysisView {
            run,
            analysis,
            target_role,
            history: self.ledger.read(),
        })
    }

    /// Rewrites the résumé behind an analysis run for `target_role`
    /// (falling back to the role remembered at submission).
    pub async fn optimize(
        &self,
        analysis_id: &str,
        target_role: Option<&str>,
    ) -> Result<Outcome, WorkflowError> {
        let _guard = InFlight::acquire(&self.in_flight)?;

        let analysis = RunId::parse(analysis_id)
            .filter(|run| self.linker.resolve(Stage::Analyze, run).is_some())
            .ok_or_else(|| self.restart_missing(Stage::Analyze, analysis_id))?;

        let role = match non_empty(target_role) {
            Some(role) => role.to_string(),
            None => self
                .linker
                .attached::<String>(TARGET_ROLE_KEY, &analysis)
                .filter(|r| !r.trim().is_empty())
                .ok_or(WorkflowError::MissingTargetRole)?,
        };

        let document = match self.stored_document(&analysis) {
            Some(doc) => doc,
            None => {
                self.transition(WorkflowState::Idle);
                return Err(WorkflowError::DocumentMissing);
            }
        };

        let epoch = self.epoch.load(Ordering::Acquire);
        self.transition(WorkflowState::Rewriting {
            analysis: analysis.clone(),
        });

        let dedup_key = fingerprint_key(Stage::Rewrite, &fingerprint(&document.bytes, &role));
        let (payload, deduplicated) = match self.cache.get_value(&dedup_key) {
            Some(cached) => (cached, true),
            None => match self.boundary.rewrite(&document, &role).await {
                Ok(payload) => (payload, false),
                Err(e) => {
                    warn!("Rewrite for '{role}' failed: {e}");
                    self.transition(WorkflowState::Analyzed { run: analysis });
                    return Err(e.into());
                }
            },
        };

        if !self.still_current(epoch) {
            info!("Rewrite finished after its view was abandoned; dropping result");
            self.transition(WorkflowState::Analyzed { run: analysis });
            return Ok(Outcome::Abandoned);
        }

        if !deduplicated {
            self.cache.set(&dedup_key, &payload);
        }

        let run = self.linker.begin_run(Stage::Rewrite);
        let persisted = self.linker.publish(Stage::Rewrite, &run, &payload);

        self.transition(WorkflowState::Rewritten { run: run.clone() });
        Ok(Outcome::Published(Published {
            stage: Stage::Rewrite,
            run,
            payload,
            persisted,
            deduplicated,
        }))
    }

    /// Loads the editor view for a rewrite run.
    pub fn open_rewrite(&self, id: &str) -> Result<RewriteView, WorkflowError> {
        let run = RunId::parse(id).ok_or_else(|| self.restart_missing(Stage::Rewrite, id))?;
        let rewrite = self
            .linker
            .resolve(Stage::Rewrite, &run)
            .ok_or_else(|| self.restart_missing(Stage::Rewrite, id))?;
        self.transition(WorkflowState::Rewritten { run: run.clone() });
        Ok(RewriteView { run, rewrite })
    }

    /// Forgets content-addressed results so the next identical submission
    /// goes to the backend again.
    pub fn clear_fingerprints(&self) -> usize {
        self.cache.clear_by_prefix(FINGERPRINT_PREFIX)
    }

    fn remember_document(&self, run: &RunId, document: &DocumentUpload) {
        if !self.linker.attach(DOCUMENT_KEY, run, &document.encode()) {
            warn!("Uploaded resume not retained for run {run}; optimize will need a fresh upload");
        }
    }

    /// The document behind an analysis run. Runs stored before documents
    /// were attached per run fall back to the single legacy slot.
    fn stored_document(&self, run: &RunId) -> Option<DocumentUpload> {
        let stored = match self.linker.attached::<StoredDocument>(DOCUMENT_KEY, run) {
            Some(stored) => stored,
            None => {
                let stored = StoredDocument {
                    file_name: self.cache.get(LEGACY_DOCUMENT_NAME_KEY)?,
                    data: self.cache.get(LEGACY_DOCUMENT_DATA_KEY)?,
                };
                debug!("Run {run} has no attached resume, using legacy slot");
                stored
            }
        };
        stored.decode()
    }
}

fn fingerprint_key(stage: Stage, digest: &str) -> String {
    format!("{FINGERPRINT_PREFIX}{stage}_{digest}")
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// `match_score` of an analysis payload, if it has a numeric one.
fn match_score(payload: &Value) -> Option<f64> {
    payload.get("match_score").and_then(Value::as_f64)
}
