//! Filesystem document store.
//!
//! Documents live under `{root}/{cis|dis}/{en|es}/{id}.json`, the file
//! stem being the CDR id and the file body the typed [`DocContent`].

use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::contract::{DocumentSource, SourceError};
use crate::document::{CatalogEntry, DocContent, DocId, DocType, Document};

const LANGCODES: [&str; 2] = ["en", "es"];

pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsDocumentSource { root: root.into() }
    }

    fn scan(&self, doc_type: DocType) -> Result<Vec<CatalogEntry>, SourceError> {
        let mut entries = Vec::new();
        for langcode in LANGCODES {
            let dir = self.root.join(doc_type.api_segment()).join(langcode);
            if !dir.is_dir() {
                continue;
            }
            for dir_entry in fs::read_dir(&dir)? {
                let path = dir_entry?.path();
                if path.extension().and_then(OsStr::to_str) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(OsStr::to_str) else {
                    continue;
                };
                let Ok(id) = stem.parse::<DocId>() else {
                    warn!(path = %path.display(), "Skipping file without a numeric CDR id");
                    continue;
                };
                entries.push(CatalogEntry {
                    id,
                    doc_type,
                    langcode: langcode.to_string(),
                });
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn list_catalog(
        &self,
        doc_type: Option<DocType>,
    ) -> Result<Vec<CatalogEntry>, SourceError> {
        let mut entries = match doc_type {
            Some(doc_type) => self.scan(doc_type)?,
            None => {
                let mut entries = self.scan(DocType::Cis)?;
                entries.extend(self.scan(DocType::Dis)?);
                entries
            }
        };
        entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        info!(count = entries.len(), root = %self.root.display(), "Catalog listed");
        Ok(entries)
    }

    async fn load_document(&self, id: DocId) -> Result<Document, SourceError> {
        for doc_type in [DocType::Cis, DocType::Dis] {
            for langcode in LANGCODES {
                let path = self
                    .root
                    .join(doc_type.api_segment())
                    .join(langcode)
                    .join(format!("{id}.json"));
                if !path.exists() {
                    continue;
                }
                let text = fs::read_to_string(&path)?;
                let content: DocContent =
                    serde_json::from_str(&text).map_err(|e| SourceError::Malformed {
                        id,
                        detail: e.to_string(),
                    })?;
                return Ok(Document {
                    id,
                    langcode: langcode.to_string(),
                    content,
                });
            }
        }
        Err(SourceError::NotFound(id))
    }
}
