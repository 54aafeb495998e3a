use serde::{Deserialize, Serialize};

/// Structured result of the analysis stage, as returned by the backend.
///
/// The cache treats this payload as opaque JSON; this type is only a typed
/// view for callers that want one. Every field is lenient because the backend
/// may omit any of them (and says so with `{"error": ...}` on failure).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeResponse {
    #[serde(alias = "resume_summary")]
    pub summary: String,
    pub extracted_skills: Vec<String>,
    /// 0.0 – 1.0. `None` when no job description was supplied.
    pub match_score: Option<f64>,
    pub improvement_areas: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_resume_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_backend_payload_deserializes() {
        let json = r#"{
            "summary": "Backend engineer with 5 years of Rust",
            "extracted_skills": ["Rust", "PostgreSQL", "Kubernetes"],
            "match_score": 0.73,
            "improvement_areas": ["Quantify impact"],
            "missing_keywords": ["Kafka"],
            "status": "completed"
        }"#;
        let parsed: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.match_score, Some(0.73));
        assert_eq!(parsed.extracted_skills.len(), 3);
        assert_eq!(parsed.status, "completed");
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let parsed: AnalyzeResponse =
            serde_json::from_str(r#"{"resume_summary": "short"}"#).unwrap();
        assert_eq!(parsed.summary, "short");
        assert!(parsed.match_score.is_none());
        assert!(parsed.extracted_skills.is_empty());
    }

    #[test]
    fn test_null_match_score_is_none() {
        let parsed: AnalyzeResponse =
            serde_json::from_str(r#"{"match_score": null}"#).unwrap();
        assert!(parsed.match_score.is_none());
    }
}
