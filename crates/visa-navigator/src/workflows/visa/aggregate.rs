use super::domain::DocumentRecord;

pub const CORPUS_SEPARATOR: &str = "\n\n";

/// Builds the corpus fed to extraction prompts.
///
/// Documents are ordered oldest first by `(created_at, id)` regardless of the order the
/// caller listed them in, so the same set of uploads always yields the same corpus.
/// Documents without extracted text contribute an empty segment.
pub fn aggregate(documents: &[DocumentRecord]) -> String {
    let mut ordered: Vec<&DocumentRecord> = documents.iter().collect();
    ordered.sort_by_key(|document| (document.created_at, document.id));

    ordered
        .into_iter()
        .map(|document| document.text_content.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(CORPUS_SEPARATOR)
}
