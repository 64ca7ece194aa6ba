//! Document → plain text of the first page.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, UnwindSafe};
use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::error::SourceError;

/// Form feed, the page separator in plain-text page dumps.
const PAGE_BREAK: char = '\u{0c}';

pub trait TextSource: Send + Sync {
    /// Plain text of the first page. Errors when the page has no text at all.
    fn first_page_text(&self, bytes: &[u8]) -> Result<String, SourceError>;

    fn name(&self) -> &'static str;
}

/// PDF documents with an embedded text layer, via pdf-extract.
pub struct PdfSource;

impl TextSource for PdfSource {
    fn first_page_text(&self, bytes: &[u8]) -> Result<String, SourceError> {
        // pdf-extract panics on some malformed font and encoding tables
        let pages = contain_panic(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|msg| SourceError::Pdf(format!("text extraction aborted: {}", msg)))?
            .map_err(|e| SourceError::Pdf(e.to_string()))?;
        debug!("pdf has {} pages", pages.len());
        let first = pages.into_iter().next().ok_or(SourceError::NoPages)?;
        non_empty(first)
    }

    fn name(&self) -> &'static str {
        "pdf-extract"
    }
}

/// UTF-8 text files; pages separated by form feeds.
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn first_page_text(&self, bytes: &[u8]) -> Result<String, SourceError> {
        let text = std::str::from_utf8(bytes).map_err(|_| SourceError::Encoding)?;
        let first = text.split(PAGE_BREAK).next().unwrap_or_default();
        non_empty(first.replace("\r\n", "\n"))
    }

    fn name(&self) -> &'static str {
        "plain-text"
    }
}

thread_local! {
    static CONTAINED: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Panics raised inside `contain_panic` on this thread go to the debug log
/// instead of stderr; every other panic reaches the previous hook.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CONTAINED.with(Cell::get) {
                debug!("contained panic: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

/// Run `f`, turning a panic into its message.
fn contain_panic<T>(f: impl FnOnce() -> T + UnwindSafe) -> Result<T, String> {
    install_quiet_hook();
    CONTAINED.with(|c| c.set(true));
    let result = panic::catch_unwind(f);
    CONTAINED.with(|c| c.set(false));
    result.map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn non_empty(text: String) -> Result<String, SourceError> {
    if text.trim().is_empty() {
        Err(SourceError::EmptyPage)
    } else {
        Ok(text)
    }
}

/// Pick a backend from the file extension.
pub fn source_for(path: &Path) -> Result<&'static dyn TextSource, SourceError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(&PdfSource),
        "txt" => Ok(&PlainTextSource),
        other => Err(SourceError::Unsupported(other.to_string())),
    }
}

pub fn read_first_page(path: &Path) -> Result<String, SourceError> {
    let source = source_for(path)?;
    let bytes = std::fs::read(path)?;
    source.first_page_text(&bytes)
}

// ── Tests ──
