//! CLI glue for pdq-push: option parsing and run wiring.
//!
//! All pipeline logic lives in the library modules; this module only maps
//! options onto the selection spec and push config, constructs the
//! concrete collaborators, and exposes an async [`run`] entrypoint that
//! integration tests can call with a constructed [`Cli`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::config::{PushConfig, DEFAULT_BATCH_SIZE};
use crate::contract::DocumentSource;
use crate::document::{DocId, DocType, Tier};
use crate::gateway::{DrupalClient, OfflineGateway};
use crate::publish::{push, PushReport, RetryPolicy};
use crate::select::{select, SelectionSpec};
use crate::store::FsDocumentSource;

/// Push PDQ summary documents to the Drupal CMS.
#[derive(Parser)]
#[clap(
    name = "pdq-push",
    version,
    about = "Push PDQ cancer and drug information summaries to the Drupal CMS"
)]
pub struct Cli {
    /// Base URL for the CMS
    #[clap(long, default_value = "http://www.devbox")]
    pub base: String,

    /// Number of drafts to mark publishable in each sweep call
    #[clap(long)]
    pub batch: Option<usize>,

    /// Enable debug logging
    #[clap(long)]
    pub debug: bool,

    /// Store summary JSON locally instead of pushing it
    #[clap(long)]
    pub dump: bool,

    /// Push specific summaries
    #[clap(long, num_args = 1..)]
    pub ids: Vec<DocId>,

    /// Maximum number of summaries to push (non-positive means no limit)
    #[clap(long)]
    pub max: Option<i64>,

    /// Number of summaries to skip past
    #[clap(long)]
    pub skip: Option<usize>,

    /// Where to link for media on Akamai
    #[clap(long, default_value = "PROD")]
    pub tier: String,

    /// Restrict the push to a single summary type (cis or dis)
    #[clap(long = "type")]
    pub doc_type: Option<DocType>,

    /// Root directory of the document store
    #[clap(long, default_value = "docs")]
    pub docs: PathBuf,
}

/// Async CLI entrypoint, shared by `main` and integration tests.
pub async fn run(cli: Cli) -> Result<PushReport> {
    let spec = SelectionSpec {
        ids: cli.ids.clone(),
        doc_type: cli.doc_type,
        skip: cli.skip.unwrap_or(0),
        max: match cli.max {
            Some(max) if max > 0 => Some(max as usize),
            _ => None,
        },
    };

    let source = FsDocumentSource::new(&cli.docs);
    let catalog = source.list_catalog(None).await?;
    let selection = select(&catalog, &spec)?;

    let config = PushConfig {
        batch_size: cli.batch.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        tier: Tier::new(&cli.tier),
        dump_dir: if cli.dump { Some(create_dump_dir()?) } else { None },
    };
    config.trace_loaded();
    let retry = RetryPolicy::default();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing the current document");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let start = std::time::Instant::now();
    let report = if cli.dump {
        push(&source, &OfflineGateway, &selection, &config, &retry, &stop).await
    } else {
        let gateway = DrupalClient::new_from_env(&cli.base)?;
        push(&source, &gateway, &selection, &config, &retry, &stop).await
    };

    let verb = if cli.dump { "Dumped" } else { "Sent" };
    tracing::info!(
        elapsed = ?start.elapsed(),
        docs = report.outcomes.len(),
        "{verb} {} docs",
        report.outcomes.len()
    );
    if let Some(dir) = &config.dump_dir {
        println!("dumped {} summaries to {}", report.dumped(), dir.display());
    }
    Ok(report)
}

/// Timestamped directory for this run's payload dumps.
fn create_dump_dir() -> std::io::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let path = PathBuf::from(format!("dumps/{stamp}"));
    std::fs::create_dir_all(&path)?;
    Ok(path)
}
