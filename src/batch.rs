use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use crate::error::SourceError;
use crate::parser::{Engine, RecordBatch};
use crate::source;

/// Who is running the batch and under which id. Passed in explicitly; the
/// engine never sees it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub operator: String,
}

impl RunContext {
    pub fn new(operator: impl Into<String>) -> Self {
        RunContext {
            run_id: new_run_id(),
            operator: operator.into(),
        }
    }
}

static RUN_SEQ: AtomicU32 = AtomicU32::new(0);

/// `run-<secs>-<nanos>-<seq>`; unique within a process even when the clock is coarse.
pub fn new_run_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("run-{}-{:09}-{}", now.as_secs(), now.subsec_nanos(), seq)
}

/// An uploaded document: display name plus where to read it from.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub path: PathBuf,
}

impl Document {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Document { name, path }
    }
}

pub struct BatchSummary {
    pub total: usize,
    pub extracted: usize,
    pub degraded: usize,
}

impl BatchSummary {
    pub fn of(batch: &RecordBatch) -> Self {
        let degraded = batch.degraded_count();
        BatchSummary {
            total: batch.len(),
            extracted: batch.len() - degraded,
            degraded,
        }
    }

    pub fn print(&self) {
        println!(
            "Processed {} documents ({} extracted, {} with errors).",
            self.total, self.extracted, self.degraded
        );
    }
}

/// Read every document from disk and extract it.
pub fn run_batch(
    engine: &Engine,
    ctx: &RunContext,
    docs: &[Document],
    show_progress: bool,
) -> RecordBatch {
    run_batch_with(engine, ctx, docs, show_progress, |doc| {
        source::read_first_page(&doc.path)
    })
}

/// Documents are independent, so they are extracted in parallel. Output
/// keeps input order and has exactly one record per document.
pub fn run_batch_with<F>(
    engine: &Engine,
    ctx: &RunContext,
    docs: &[Document],
    show_progress: bool,
    read: F,
) -> RecordBatch
where
    F: Fn(&Document) -> Result<String, SourceError> + Sync,
{
    info!(
        run_id = %ctx.run_id,
        operator = %ctx.operator,
        profile = engine.rules().name(),
        "Extracting {} documents",
        docs.len()
    );

    let pb = if show_progress {
        ProgressBar::new(docs.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);

    let records: Vec<_> = docs
        .par_iter()
        .map(|doc| {
            let record = engine.extract_with(&doc.name, || read(doc));
            pb.inc(1);
            record
        })
        .collect();
    pb.finish_and_clear();

    let batch = RecordBatch::from_records(engine.rules(), records);
    info!(
        run_id = %ctx.run_id,
        degraded = batch.degraded_count(),
        "Batch finished"
    );
    batch
}

// ── Tests ──
