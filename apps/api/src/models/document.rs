use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An uploaded résumé file. Text extraction happens in the backend; here the
/// document is only bytes plus the name it was uploaded under.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn encode(&self) -> StoredDocument {
        StoredDocument {
            file_name: self.file_name.clone(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

/// Text-safe form of a document, for string-only storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub file_name: String,
    pub data: String,
}

impl StoredDocument {
    /// `None` when the stored data is not valid base64.
    pub fn decode(&self) -> Option<DocumentUpload> {
        let bytes = STANDARD.decode(self.data.as_bytes()).ok()?;
        Some(DocumentUpload::new(self.file_name.clone(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_document_survives_encoding() {
        let doc = DocumentUpload::new("resume.pdf", vec![0u8, 159, 146, 150, 255]);
        assert_eq!(doc.encode().decode(), Some(doc));
    }

    #[test]
    fn test_invalid_base64_decodes_to_none() {
        let stored = StoredDocument {
            file_name: "resume.pdf".into(),
            data: "***".into(),
        };
        assert!(stored.decode().is_none());
    }
}
