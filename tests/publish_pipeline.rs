use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pdq_push::config::PushConfig;
use pdq_push::contract::{
    DeliveryError, MockCmsGateway, MockDocumentSource, NodeId, SourceError, SweepError,
};
use pdq_push::document::{
    CatalogEntry, CisDoc, DocContent, DocId, DocType, Document, Section, Tier,
};
use pdq_push::publish::{push, Outcome, RetryPolicy};
use pdq_push::transform::transform;

fn cis_document(id: DocId, langcode: &str) -> Document {
    Document {
        id,
        langcode: langcode.to_string(),
        content: DocContent::Cis(CisDoc {
            title: format!("Summary {id}"),
            browser_title: format!("Summary {id}"),
            cthp_card_title: None,
            description: "A summary.".into(),
            summary_type: "Treatment".into(),
            audience: "Patients".into(),
            url: Some(format!("/types/test/{id}")),
            translation_of: None,
            posted_date: None,
            updated_date: None,
            svpc: false,
            suppress_otp: false,
            intro_text: None,
            sections: vec![Section {
                id: format!("_section_{id}"),
                title: "Overview".into(),
                html: "<p>@@MEDIA-TIER@@</p>".into(),
            }],
        }),
    }
}

fn selection_of(ids: &[DocId]) -> Vec<CatalogEntry> {
    ids.iter()
        .map(|&id| CatalogEntry {
            id,
            doc_type: DocType::Cis,
            langcode: "en".into(),
        })
        .collect()
}

fn source_with_docs() -> MockDocumentSource {
    let mut source = MockDocumentSource::new();
    source
        .expect_load_document()
        .returning(|id| Ok(cis_document(id, "en")));
    source
}

fn config() -> PushConfig {
    PushConfig {
        batch_size: 25,
        tier: Tier::new("PROD"),
        dump_dir: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn seven_deliveries_sweep_in_batches_of_three() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2, 3, 4, 5, 6, 7]);

    let mut gateway = MockCmsGateway::new();
    gateway
        .expect_create_draft()
        .times(7)
        .returning(|payload| Ok(1000 + payload.cdr_id()));

    let sweeps: Arc<Mutex<Vec<Vec<NodeId>>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = sweeps.clone();
    gateway.expect_publish_batch().times(3).returning(move |batch| {
        recorded
            .lock()
            .unwrap()
            .push(batch.iter().map(|doc| doc.nid).collect());
        Ok(())
    });

    let mut config = config();
    config.batch_size = 3;
    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config, &fast_retry(), &stop).await;

    assert_eq!(report.published(), 7);
    assert_eq!(report.failed(), 0);

    let sweeps = sweeps.lock().unwrap();
    let sizes: Vec<usize> = sweeps.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    // Every delivered node id appears in exactly one sweep, in delivery order.
    let all: Vec<NodeId> = sweeps.iter().flatten().copied().collect();
    assert_eq!(all, vec![1001, 1002, 1003, 1004, 1005, 1006, 1007]);
}

#[tokio::test]
async fn transform_failure_is_isolated_to_one_document() {
    let mut source = MockDocumentSource::new();
    source.expect_load_document().returning(|id| {
        let mut doc = cis_document(id, "en");
        if id == 4 {
            // No URL makes the document untransformable.
            if let DocContent::Cis(cis) = &mut doc.content {
                cis.url = None;
            }
        }
        Ok(doc)
    });
    let selection = selection_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

    let mut gateway = MockCmsGateway::new();
    gateway
        .expect_create_draft()
        .times(9)
        .returning(|payload| Ok(1000 + payload.cdr_id()));
    let sweeps: Arc<Mutex<Vec<Vec<NodeId>>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = sweeps.clone();
    gateway.expect_publish_batch().times(1).returning(move |batch| {
        recorded
            .lock()
            .unwrap()
            .push(batch.iter().map(|doc| doc.nid).collect());
        Ok(())
    });

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;

    assert_eq!(report.published(), 9);
    assert_eq!(report.failed(), 1);
    let failed: Vec<DocId> = report
        .outcomes
        .iter()
        .filter(|doc| matches!(doc.outcome, Outcome::Failed { .. }))
        .map(|doc| doc.id)
        .collect();
    assert_eq!(failed, vec![4]);

    // The bad document does not disturb the others' ordering or batching.
    let all: Vec<NodeId> = sweeps.lock().unwrap().iter().flatten().copied().collect();
    assert_eq!(all, vec![1001, 1002, 1003, 1005, 1006, 1007, 1008, 1009, 1010]);
}

#[tokio::test]
async fn missing_document_fails_only_itself() {
    let mut source = MockDocumentSource::new();
    source.expect_load_document().returning(|id| {
        if id == 2 {
            Err(SourceError::NotFound(2))
        } else {
            Ok(cis_document(id, "en"))
        }
    });
    let selection = selection_of(&[1, 2, 3]);

    let mut gateway = MockCmsGateway::new();
    gateway
        .expect_create_draft()
        .times(2)
        .returning(|payload| Ok(payload.cdr_id()));
    gateway.expect_publish_batch().times(1).returning(|_| Ok(()));

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;
    assert_eq!(report.published(), 2);
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn transient_delivery_failures_are_retried() {
    let source = source_with_docs();
    let selection = selection_of(&[1]);

    let mut gateway = MockCmsGateway::new();
    let mut calls = 0;
    gateway.expect_create_draft().times(3).returning(move |payload| {
        calls += 1;
        if calls < 3 {
            Err(DeliveryError::Server {
                status: 503,
                reason: "Service Unavailable".into(),
            })
        } else {
            Ok(payload.cdr_id())
        }
    });
    gateway.expect_publish_batch().times(1).returning(|_| Ok(()));

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;
    assert_eq!(report.published(), 1);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn exhausted_retries_fail_the_document_and_the_run_continues() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2]);

    let mut gateway = MockCmsGateway::new();
    gateway.expect_create_draft().times(4).returning(|payload| {
        if payload.cdr_id() == 1 {
            Err(DeliveryError::Server {
                status: 500,
                reason: "Internal Server Error".into(),
            })
        } else {
            Ok(payload.cdr_id())
        }
    });
    let sweeps: Arc<Mutex<Vec<Vec<NodeId>>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = sweeps.clone();
    gateway.expect_publish_batch().times(1).returning(move |batch| {
        recorded
            .lock()
            .unwrap()
            .push(batch.iter().map(|doc| doc.nid).collect());
        Ok(())
    });

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.published(), 1);
    // Only the delivered document reaches the sweep.
    assert_eq!(*sweeps.lock().unwrap(), vec![vec![2]]);
}

#[tokio::test]
async fn sweep_failure_marks_the_whole_batch_failed() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2]);

    let mut gateway = MockCmsGateway::new();
    gateway
        .expect_create_draft()
        .times(2)
        .returning(|payload| Ok(payload.cdr_id()));
    gateway.expect_publish_batch().times(3).returning(|_| {
        Err(DeliveryError::Server {
            status: 503,
            reason: "Service Unavailable".into(),
        })
    });

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;

    assert_eq!(report.published(), 0);
    assert_eq!(report.failed(), 2);
    for doc in &report.outcomes {
        match &doc.outcome {
            Outcome::Failed { reason } => assert!(reason.contains("publish sweep failed")),
            other => panic!("expected a failed outcome, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn sweep_rejection_fails_only_the_named_documents() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2]);

    let mut gateway = MockCmsGateway::new();
    gateway
        .expect_create_draft()
        .times(2)
        .returning(|payload| Ok(payload.cdr_id()));
    // The CMS answers the sweep but refuses one document. Retrying would
    // change nothing, so exactly one call is made.
    gateway.expect_publish_batch().times(1).returning(|_| {
        Err(DeliveryError::Rejected(vec![SweepError {
            nid: 1,
            langcode: "en".into(),
            message: "node is locked".into(),
        }]))
    });

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;

    assert_eq!(report.published(), 1);
    assert_eq!(report.failed(), 1);
    for doc in &report.outcomes {
        match (doc.id, &doc.outcome) {
            (1, Outcome::Failed { reason }) => assert_eq!(reason, "node is locked"),
            (2, Outcome::Published { nid }) => assert_eq!(*nid, 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[tokio::test]
async fn missing_english_original_is_not_retried() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2]);

    let mut gateway = MockCmsGateway::new();
    // One attempt per document: the missing original is definitive, not
    // transient, so the policy's extra attempts are never used.
    gateway.expect_create_draft().times(2).returning(|payload| {
        if payload.cdr_id() == 1 {
            Err(DeliveryError::MissingTranslation(1))
        } else {
            Ok(payload.cdr_id())
        }
    });
    gateway.expect_publish_batch().times(1).returning(|_| Ok(()));

    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config(), &fast_retry(), &stop).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.published(), 1);
    let failed: Vec<DocId> = report
        .outcomes
        .iter()
        .filter(|doc| matches!(doc.outcome, Outcome::Failed { .. }))
        .map(|doc| doc.id)
        .collect();
    assert_eq!(failed, vec![1]);
}

#[tokio::test]
async fn dump_mode_writes_the_exact_gateway_payload() {
    let tmp = tempfile::tempdir().unwrap();
    let source = source_with_docs();
    let selection = selection_of(&[62787]);

    // No gateway expectations: dump mode must never call it.
    let gateway = MockCmsGateway::new();

    let config = PushConfig {
        batch_size: 25,
        tier: Tier::new("QA"),
        dump_dir: Some(tmp.path().to_path_buf()),
    };
    let stop = AtomicBool::new(false);
    let report = push(&source, &gateway, &selection, &config, &fast_retry(), &stop).await;

    assert_eq!(report.dumped(), 1);
    assert_eq!(report.published(), 0);

    let dumped = std::fs::read_to_string(tmp.path().join("62787.json")).unwrap();
    let expected = transform(&cis_document(62787, "en"), &Tier::new("QA")).unwrap();
    assert_eq!(dumped, serde_json::to_string_pretty(&expected).unwrap());
}

#[tokio::test]
async fn stop_request_finishes_the_current_document_and_flushes() {
    let source = source_with_docs();
    let selection = selection_of(&[1, 2, 3]);

    let stop = Arc::new(AtomicBool::new(false));
    let mut gateway = MockCmsGateway::new();
    let stop_after_first = stop.clone();
    gateway.expect_create_draft().times(1).returning(move |payload| {
        stop_after_first.store(true, Ordering::Relaxed);
        Ok(payload.cdr_id())
    });
    gateway.expect_publish_batch().times(1).returning(|_| Ok(()));

    let mut config = config();
    config.batch_size = 10;
    let report = push(&source, &gateway, &selection, &config, &fast_retry(), &stop).await;

    // The first document completes and its draft is swept; no further
    // document is begun.
    assert_eq!(report.published(), 1);
    assert_eq!(report.outcomes.len(), 1);
}
