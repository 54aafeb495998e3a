pub mod analysis;
pub mod document;
pub mod rewrite;

pub use analysis::AnalyzeResponse;
pub use document::{DocumentUpload, StoredDocument};
pub use rewrite::RewriteResponse;
