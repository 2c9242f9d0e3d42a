//! Sample data for fresh stores.

use crate::model::analysis::{AnalysisType, DocumentAnalysis};
use crate::model::document::{Document, DocumentStatus};
use crate::repo::RepoResult;
use crate::uow::UnitOfWork;
use log::info;
use serde_json::json;

pub const WELCOME_TITLE: &str = "Welcome to TechScriptAid Enterprise AI";

/// Seeds sample documents and one analysis when no document is visible.
///
/// Returns the number of rows written, `0` when the store already has data.
pub fn seed_sample_data(uow: &UnitOfWork) -> RepoResult<usize> {
    let documents = uow.documents();
    if documents.count(None)? > 0 {
        info!("event=seed module=seed status=skipped reason=not_empty");
        return Ok(0);
    }

    let welcome = documents.add(
        Document::new(
            WELCOME_TITLE,
            "This platform stores enterprise documents and enriches them with AI analysis.",
            "Tutorial",
        )
        .with_status(DocumentStatus::Published)
        .with_tags(["welcome", "getting-started", "ai"]),
    )?;
    documents.add(
        Document::new(
            "Integrating Language Models into Enterprise Workflows",
            "A walkthrough of summarization and classification pipelines for document stores.",
            "Technical",
        )
        .with_tags(["llm", "integration"]),
    )?;
    documents.add(
        Document::new(
            "Repository and Unit of Work Patterns",
            "How repositories and a unit of work keep persistence concerns out of services.",
            "Architecture",
        )
        .with_status(DocumentStatus::Published)
        .with_tags(["patterns", "persistence"]),
    )?;

    let mut summary = DocumentAnalysis::new(welcome.id, AnalysisType::Summary);
    summary.set_results(&json!({
        "summary": "Introduction to the document platform and its AI features.",
        "key_phrases": ["enterprise", "AI", "documents"],
    }))?;
    summary.confidence_score = 0.85;
    uow.analyses().add(summary)?;

    let affected = uow.save_changes()?;
    info!("event=seed module=seed status=ok rows={affected}");
    Ok(affected)
}
