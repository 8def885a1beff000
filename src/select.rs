//! Run Selection: which documents a push run will process.
//!
//! The selection is computed once, deterministically, before any
//! transformation begins. An explicit id list is taken verbatim (the
//! caller has already been specific, so the type filter and skip/max
//! windowing do not apply); otherwise the catalog is filtered and
//! windowed in stable catalog order, which keeps repeated skip/max
//! invocations reproducible.

use tracing::{info, warn};

use crate::document::{CatalogEntry, DocId, DocType};

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct SelectionSpec {
    /// Explicit ids; empty means "derive the selection from the catalog".
    pub ids: Vec<DocId>,
    pub doc_type: Option<DocType>,
    pub skip: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
}

/// An explicit id was requested that the catalog does not contain.
/// Fatal to the run: it signals a caller mistake, caught before any
/// document is transformed.
#[derive(Debug, PartialEq, Eq)]
pub struct SelectionError {
    pub id: DocId,
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CDR{} not found", self.id)
    }
}

impl std::error::Error for SelectionError {}

/// Compute the ordered Run Selection.
pub fn select(
    catalog: &[CatalogEntry],
    spec: &SelectionSpec,
) -> Result<Vec<CatalogEntry>, SelectionError> {
    if !spec.ids.is_empty() {
        let mut picked = Vec::with_capacity(spec.ids.len());
        for &id in &spec.ids {
            match catalog.iter().find(|entry| entry.id == id) {
                Some(entry) => picked.push(entry.clone()),
                None => return Err(SelectionError { id }),
            }
        }
        picked.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        info!(count = picked.len(), "Selected explicitly requested summaries");
        return Ok(picked);
    }

    let mut docs: Vec<CatalogEntry> = catalog
        .iter()
        .filter(|entry| spec.doc_type.map_or(true, |t| entry.doc_type == t))
        .cloned()
        .collect();
    docs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let docs: Vec<CatalogEntry> = docs
        .into_iter()
        .skip(spec.skip)
        .take(spec.max.unwrap_or(usize::MAX))
        .collect();

    if docs.is_empty() {
        warn!("no summaries to push");
    } else {
        info!(count = docs.len(), "pushing {} summaries", docs.len());
    }
    Ok(docs)
}
