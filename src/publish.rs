//! High-level pipeline: load → transform → deliver (or dump) → sweep.
//!
//! [`push`] walks the Run Selection sequentially, one document at a time
//! and one request in flight at a time; the CMS is easy to overload, so
//! the pipeline trades throughput for predictable load and simple batch
//! bookkeeping. Delivered drafts accumulate in a pending batch that is
//! swept to the `published` state whenever it fills, plus once more at
//! end of run for any remainder.
//!
//! # Error handling
//! Per-document problems (a document missing from the store, a malformed
//! document, delivery retries exhausted) mark that document failed and
//! the run continues; the final [`PushReport`] says what happened to
//! every selected document. Only selection and configuration problems
//! abort a run, and those are caught before this module is reached.
//!
//! # Cancellation
//! The `stop` flag is checked between documents. A requested stop
//! finishes the current document, sweeps whatever drafts are pending,
//! and returns.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::PushConfig;
use crate::contract::{CmsGateway, DeliveryError, DocumentSource, NodeId, PushedDoc};
use crate::document::{CatalogEntry, DocId};
use crate::transform::{transform, DraftPayload};

/// Bounded retry with linearly increasing delay, injected into the
/// publisher so transient-failure behaviour is testable on its own.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Terminal state of one selected document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload written locally; dump runs never reach the CMS.
    Dumped,
    /// Draft stored and swept to the published state.
    Published { nid: NodeId },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct DocOutcome {
    pub id: DocId,
    pub langcode: String,
    pub outcome: Outcome,
}

/// What happened to every document in the run, in selection order.
#[derive(Debug, Default)]
pub struct PushReport {
    pub outcomes: Vec<DocOutcome>,
}

impl PushReport {
    pub fn dumped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Dumped))
    }

    pub fn published(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Published { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|d| pred(&d.outcome)).count()
    }
}

/// Push every document in `selection`, in order.
pub async fn push<S, G>(
    source: &S,
    gateway: &G,
    selection: &[CatalogEntry],
    config: &PushConfig,
    retry: &RetryPolicy,
    stop: &AtomicBool,
) -> PushReport
where
    S: DocumentSource,
    G: CmsGateway,
{
    info!(
        count = selection.len(),
        batch_size = config.batch_size,
        dump = config.dump_dir.is_some(),
        "Starting push run"
    );

    let mut report = PushReport::default();
    let mut pending: Vec<PushedDoc> = Vec::new();

    for entry in selection {
        if stop.load(Ordering::Relaxed) {
            warn!(
                processed = report.outcomes.len(),
                selected = selection.len(),
                "Stop requested, ending run after the current batch"
            );
            break;
        }

        let doc = match source.load_document(entry.id).await {
            Ok(doc) => doc,
            Err(e) => {
                error!(cdr_id = entry.id, error = %e, "Failed to load document");
                report.outcomes.push(failed(entry, e.to_string()));
                continue;
            }
        };

        let payload = match transform(&doc, &config.tier) {
            Ok(payload) => payload,
            Err(e) => {
                error!(cdr_id = entry.id, error = %e, "Failed to transform document");
                report.outcomes.push(failed(entry, e.to_string()));
                continue;
            }
        };

        if let Some(dump_dir) = &config.dump_dir {
            match dump_payload(dump_dir, entry.id, &payload) {
                Ok(path) => {
                    debug!(cdr_id = entry.id, path = %path.display(), "Dumped payload");
                    report.outcomes.push(DocOutcome {
                        id: entry.id,
                        langcode: entry.langcode.clone(),
                        outcome: Outcome::Dumped,
                    });
                }
                Err(e) => {
                    error!(cdr_id = entry.id, error = %e, "Failed to dump payload");
                    report.outcomes.push(failed(entry, e.to_string()));
                }
            }
            continue;
        }

        match deliver(gateway, &payload, retry).await {
            Ok(nid) => {
                debug!(cdr_id = entry.id, nid, "Draft stored");
                pending.push(PushedDoc {
                    id: entry.id,
                    nid,
                    langcode: entry.langcode.clone(),
                });
                if pending.len() >= config.batch_size {
                    flush(gateway, &mut pending, retry, &mut report).await;
                }
            }
            Err(e) => {
                error!(cdr_id = entry.id, error = %e, "Delivery failed after retries");
                report.outcomes.push(failed(entry, e.to_string()));
            }
        }
    }

    if !pending.is_empty() {
        flush(gateway, &mut pending, retry, &mut report).await;
    }

    info!(
        dumped = report.dumped(),
        published = report.published(),
        failed = report.failed(),
        "Push run complete"
    );
    report
}

fn failed(entry: &CatalogEntry, reason: String) -> DocOutcome {
    DocOutcome {
        id: entry.id,
        langcode: entry.langcode.clone(),
        outcome: Outcome::Failed { reason },
    }
}

/// Store one draft, retrying transient failures per the policy. A
/// definitive answer from the CMS (a rejection, a missing English
/// original) fails immediately.
async fn deliver<G: CmsGateway>(
    gateway: &G,
    payload: &DraftPayload,
    retry: &RetryPolicy,
) -> Result<NodeId, DeliveryError> {
    let mut attempt = 1;
    loop {
        match gateway.create_draft(payload).await {
            Ok(nid) => return Ok(nid),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                warn!(
                    cdr_id = payload.cdr_id(),
                    attempt,
                    error = %e,
                    "create_draft failed (trying again)"
                );
                tokio::time::sleep(retry.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sweep the pending batch to the published state. A sweep that exhausts
/// its retries fails every member of the batch; a sweep the CMS answers
/// with per-document error rows is not retried, and fails only the
/// documents the rows name. Either way the run continues.
async fn flush<G: CmsGateway>(
    gateway: &G,
    pending: &mut Vec<PushedDoc>,
    retry: &RetryPolicy,
    report: &mut PushReport,
) {
    let batch = std::mem::take(pending);
    info!(count = batch.len(), "Marking batch of drafts published");

    let mut attempt = 1;
    let result = loop {
        match gateway.publish_batch(&batch).await {
            Ok(()) => break Ok(()),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                warn!(attempt, error = %e, "publish_batch failed (trying again)");
                tokio::time::sleep(retry.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => break Err(e),
        }
    };

    match result {
        Ok(()) => {
            for doc in batch {
                report.outcomes.push(DocOutcome {
                    id: doc.id,
                    langcode: doc.langcode,
                    outcome: Outcome::Published { nid: doc.nid },
                });
            }
        }
        Err(DeliveryError::Rejected(errors)) => {
            error!(
                rejected = errors.len(),
                count = batch.len(),
                "CMS refused documents in the publish sweep"
            );
            for doc in batch {
                let rejection = errors
                    .iter()
                    .find(|err| err.nid == doc.nid && err.langcode == doc.langcode);
                let outcome = match rejection {
                    Some(err) => Outcome::Failed {
                        reason: err.message.clone(),
                    },
                    None => Outcome::Published { nid: doc.nid },
                };
                report.outcomes.push(DocOutcome {
                    id: doc.id,
                    langcode: doc.langcode,
                    outcome,
                });
            }
        }
        Err(e) => {
            error!(count = batch.len(), error = %e, "Publish sweep failed for batch");
            for doc in batch {
                report.outcomes.push(DocOutcome {
                    id: doc.id,
                    langcode: doc.langcode,
                    outcome: Outcome::Failed {
                        reason: format!("publish sweep failed: {e}"),
                    },
                });
            }
        }
    }
}

/// Write the payload exactly as it would have been submitted, keyed by
/// CDR id, so dumps can be diffed against gateway submissions.
fn dump_payload(dir: &Path, id: DocId, payload: &DraftPayload) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{id}.json"));
    let json = serde_json::to_string_pretty(payload)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
