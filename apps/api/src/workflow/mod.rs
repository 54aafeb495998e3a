// Workflow layer: threads stage results between independently loaded views.
// Linker stores/resolves run artifacts, ledger keeps the score trend,
// session drives the analyze → rewrite state machine on top of both.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod ledger;
pub mod linker;
pub mod session;

pub use ledger::{ChartPoint, HistoryEntry, ScoreLedger};
pub use linker::{RunId, WorkflowLinker};
pub use session::{
    AnalysisView, Outcome, Published, RewriteView, SubmitRequest, Workflow, WorkflowState,
};

/// One step of the pipeline. The tag prefixes every run key (`"{stage}_{id}"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Rewrite,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Rewrite => "rewrite",
        }
    }

    /// Prefix shared by every run key of this stage.
    pub fn key_prefix(&self) -> String {
        format!("{}_", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        assert_eq!(Stage::Analyze.as_str(), "analyze");
        assert_eq!(Stage::Rewrite.to_string(), "rewrite");
        assert_eq!(Stage::Rewrite.key_prefix(), "rewrite_");
    }

    #[test]
    fn test_stage_serde_snake_case() {
        let stage: Stage = serde_json::from_str(r#""analyze""#).unwrap();
        assert_eq!(stage, Stage::Analyze);
    }
}
