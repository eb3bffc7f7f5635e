//! Rendering retrieved chunks for the model.

use advisor_core::ScoredChunk;

/// Shown to the model when retrieval found nothing.
pub const NO_CONTEXT: &str = "No context found.";

/// Render chunks as `[METADATA:{json}]\nCONTENT:{content}` blocks separated
/// by blank lines, best match first.
pub fn format_context(results: &[ScoredChunk]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }
    results
        .iter()
        .map(|r| {
            let metadata = serde_json::to_string(&r.chunk.metadata).unwrap_or_default();
            format!("[METADATA:{}]\nCONTENT:{}", metadata, r.chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
