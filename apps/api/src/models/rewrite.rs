use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub linkedin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceItem {
    pub title: String,
    pub company: String,
    pub dates: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationItem {
    pub school: String,
    pub degree: String,
    pub dates: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillCategory {
    pub technical: Vec<String>,
    pub tools: Vec<String>,
    pub soft_skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectItem {
    pub name: String,
    pub description: String,
    pub link: String,
}

/// A résumé rewritten for a target role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewrittenResume {
    pub contact_info: ContactInfo,
    pub summary: String,
    pub experience: Vec<ExperienceItem>,
    pub education: Vec<EducationItem>,
    pub skills: SkillCategory,
    pub projects: Vec<ProjectItem>,
    pub full_text: String,
}

/// Envelope returned by the backend's rewrite endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteResponse {
    pub target_role: String,
    pub rewritten_resume: RewrittenResume,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_payload_deserializes() {
        let json = r#"{
            "target_role": "Backend Engineer",
            "rewritten_resume": {
                "contact_info": {"name": "Ada", "email": "ada@example.com"},
                "summary": "Backend engineer focused on reliability",
                "experience": [{"title": "SWE", "company": "Acme", "dates": "2020-2024"}],
                "education": [],
                "skills": {"technical": ["Rust"], "tools": ["Docker"], "soft_skills": []},
                "projects": [{"name": "resumeflow"}],
                "full_text": "..."
            }
        }"#;
        let parsed: RewriteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.target_role, "Backend Engineer");
        assert_eq!(parsed.rewritten_resume.contact_info.name, "Ada");
        assert_eq!(parsed.rewritten_resume.contact_info.phone, "");
        assert_eq!(parsed.rewritten_resume.experience[0].company, "Acme");
        assert_eq!(parsed.rewritten_resume.skills.tools, vec!["Docker"]);
    }

    #[test]
    fn test_empty_object_is_default() {
        let parsed: RewriteResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, RewriteResponse::default());
    }
}
