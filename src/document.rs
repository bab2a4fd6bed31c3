use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use ropey::Rope;
use tracing::debug;
use url::Url;

/// Stable identity of a live document for the whole editing session.
///
/// Identity is allocated from a process-wide serial counter when the
/// `Document` is constructed, never reused, and keys the manager's
/// document-to-monitor mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u32);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

static SERIAL_DOCUMENT_ID: AtomicU32 = AtomicU32::new(0);

fn next_document_id() -> DocumentId {
    DocumentId(SERIAL_DOCUMENT_ID.fetch_add(1, Ordering::SeqCst))
}

/// Mutable state of an open document: its buffer text and version.
#[derive(Debug)]
pub struct DocumentState {
    pub uri: Url,
    pub text: Rope,
    pub version: i32,
}

/// A live, host-managed editable text buffer together with its view.
///
/// The crate references documents but never owns their lifecycle: the host
/// creates them, delivers open/close events, and drives edits. `edit` exists
/// so hosts and tests can reproduce buffer rewrites against the same type.
#[derive(Debug)]
pub struct Document {
    pub id: DocumentId,
    pub state: RwLock<DocumentState>,
}

impl Document {
    pub fn new(uri: Url, text: &str) -> Arc<Self> {
        let id = next_document_id();
        debug!("Created document: URI={}, id={}", uri, id);
        Arc::new(Document {
            id,
            state: RwLock::new(DocumentState {
                uri,
                text: Rope::from_str(text),
                version: 0,
            }),
        })
    }

    /// Returns the URI of the document.
    pub fn uri(&self) -> Url {
        self.state.read().uri.clone()
    }

    /// Returns the current text of the document as a string.
    pub fn text(&self) -> String {
        self.state.read().text.to_string()
    }

    /// Returns the current version of the document.
    pub fn version(&self) -> i32 {
        self.state.read().version
    }

    /// Returns the length of the document in bytes.
    pub fn len_bytes(&self) -> usize {
        self.state.read().text.len_bytes()
    }

    /// Replaces the characters in `range` with `replacement`, bumping the
    /// version. Host-side edit entry point; the monitoring core itself never
    /// mutates buffer content.
    pub fn edit(&self, range: Range<usize>, replacement: &str) -> i32 {
        let mut state = self.state.write();
        state.text.remove(range.clone());
        state.text.insert(range.start, replacement);
        state.version += 1;
        state.version
    }
}

/// Opaque handle to a document's underlying text storage.
///
/// Whatever the host's adapter resolves for a buffer is passed through to the
/// monitor unexamined; the core only requires it to be shareable across
/// threads.
pub trait BufferHandle: Send + Sync + fmt::Debug {}

/// Host service mapping a document's buffer to the storage handle a monitor
/// needs. Resolution failures are contained by the manager and never surface
/// to the document-open notification path.
pub trait TextHandleResolver: Send + Sync {
    fn resolve(&self, document: &Arc<Document>) -> anyhow::Result<Arc<dyn BufferHandle>>;
}

/// Default buffer handle: a weak reference back to the document itself, for
/// hosts whose storage model is the `Document` rope.
#[derive(Debug)]
pub struct DocumentTextHandle {
    document: Weak<Document>,
}

impl DocumentTextHandle {
    pub fn document(&self) -> Option<Arc<Document>> {
        self.document.upgrade()
    }
}

impl BufferHandle for DocumentTextHandle {}

/// Default resolver producing a `DocumentTextHandle`.
#[derive(Debug, Default)]
pub struct DocumentTextResolver;

impl TextHandleResolver for DocumentTextResolver {
    fn resolve(&self, document: &Arc<Document>) -> anyhow::Result<Arc<dyn BufferHandle>> {
        // The handle must not keep the document alive past its close event,
        // so it holds a weak reference.
        debug!("Resolved text handle for URI={}, id={}", document.uri(), document.id);
        Ok(Arc::new(DocumentTextHandle {
            document: Arc::downgrade(document),
        }))
    }
}
