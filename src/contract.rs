//! Collaborator seams for the push pipeline.
//!
//! Two traits define everything the publisher needs from the outside world:
//! [`DocumentSource`] supplies the catalog and document content, and
//! [`CmsGateway`] is the remote Drupal API (draft creation plus the
//! draft-to-published sweep). Both are async and annotated for `mockall`,
//! so the pipeline can be exercised in tests without network or filesystem
//! access. Concrete implementations live in `store` and `gateway`.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::document::{CatalogEntry, DocId, DocType, Document};
use crate::transform::DraftPayload;

/// Drupal node identifier assigned by the CMS when a draft is stored.
pub type NodeId = u64;

/// A draft already stored in the CMS, waiting for the publish sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedDoc {
    pub id: DocId,
    pub nid: NodeId,
    pub langcode: String,
}

/// Error from the document store.
#[derive(Debug)]
pub enum SourceError {
    NotFound(DocId),
    Io(std::io::Error),
    Malformed { id: DocId, detail: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::NotFound(id) => write!(f, "CDR{id} not found in the document store"),
            SourceError::Io(e) => write!(f, "document store I/O error: {e}"),
            SourceError::Malformed { id, detail } => {
                write!(f, "CDR{id} is not a valid summary document: {detail}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// One document the CMS refused in an otherwise answered publish sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepError {
    pub nid: NodeId,
    pub langcode: String,
    pub message: String,
}

/// Error talking to the CMS.
#[derive(Debug)]
pub enum DeliveryError {
    /// The client could not be configured (missing credentials, bad base URL).
    Config(String),
    /// Transport-level failure before a response was received.
    Http(String),
    /// The CMS answered with a non-success status.
    Server { status: u16, reason: String },
    /// The CMS answered, but the body was not what the API promises.
    BadResponse(String),
    /// The publish sweep was answered, but the CMS refused the named
    /// documents. Retrying changes nothing; only those documents failed.
    Rejected(Vec<SweepError>),
    /// A Spanish summary was pushed before its English original.
    MissingTranslation(DocId),
}

impl DeliveryError {
    /// Whether another attempt could plausibly succeed. Only transport
    /// and server-side failures are worth retrying; everything else is
    /// a definitive answer from the CMS or a caller mistake.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Http(_) | DeliveryError::Server { .. })
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Config(msg) => write!(f, "gateway configuration error: {msg}"),
            DeliveryError::Http(msg) => write!(f, "HTTP error: {msg}"),
            DeliveryError::Server { status, reason } => {
                write!(f, "CMS returned status {status}: {reason}")
            }
            DeliveryError::BadResponse(msg) => write!(f, "unexpected CMS response: {msg}"),
            DeliveryError::Rejected(errors) => {
                write!(f, "CMS rejected {} documents in the publish sweep", errors.len())
            }
            DeliveryError::MissingTranslation(id) => {
                write!(f, "CDR{id}: English summary must be saved first")
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Supplies the ordered document catalog and typed document content.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List the catalog, optionally restricted to one summary type,
    /// in stable catalog order.
    async fn list_catalog(
        &self,
        doc_type: Option<DocType>,
    ) -> Result<Vec<CatalogEntry>, SourceError>;

    /// Load one document by CDR id.
    async fn load_document(&self, id: DocId) -> Result<Document, SourceError>;
}

/// The remote CMS ingestion API.
///
/// Both operations are safe to retry: storing the same payload twice is
/// acceptable, and the sweep is idempotent on the CMS side.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CmsGateway: Send + Sync {
    /// Store a document in the CMS in the `draft` state and return the
    /// node id it landed in.
    async fn create_draft(&self, payload: &DraftPayload) -> Result<NodeId, DeliveryError>;

    /// Switch a batch of stored drafts from `draft` to `published`.
    async fn publish_batch(&self, batch: &[PushedDoc]) -> Result<(), DeliveryError>;
}
