//! Generic trait for external-edit detection
//!
//! Provides a standardized interface for deciding whether a newly opened
//! document is relevant to a particular kind of non-interactive edit.
//! Detectors are assembled into an ordered roster at composition time and
//! probed once per document open.

use std::sync::Arc;

use thiserror::Error;

use crate::annotations::AnnotationSource;
use crate::document::Document;

/// Outcome of probing one detector against one document.
#[derive(Clone)]
pub enum Probe {
    /// The detector wants no association with this document; no state is
    /// retained for it.
    NotInterested,
    /// The detector joins the document's monitor, optionally supplying an
    /// annotation source it wants watched.
    Interested {
        annotation_source: Option<Arc<dyn AnnotationSource>>,
    },
}

impl Probe {
    /// Interest with no annotation source of its own.
    pub fn interested() -> Self {
        Probe::Interested {
            annotation_source: None,
        }
    }

    /// Interest together with an annotation source to watch.
    pub fn watching(source: Arc<dyn AnnotationSource>) -> Self {
        Probe::Interested {
            annotation_source: Some(source),
        }
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::NotInterested => write!(f, "NotInterested"),
            Probe::Interested { annotation_source } => f
                .debug_struct("Interested")
                .field("annotation_source", &annotation_source.is_some())
                .finish(),
        }
    }
}

/// A detector that cannot evaluate interest reports one of these; the manager
/// logs it and treats the detector as not interested for that document.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("host capability unavailable: {0}")]
    MissingCapability(String),
    #[error("document state inaccessible: {0}")]
    Document(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Trait for detecting external-edit relevance of a document
///
/// Implementors decide, once per document open, whether edits arriving
/// outside the keystroke path on that document concern them, and may supply
/// an annotation source for the document's monitor to watch.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; hosts may deliver lifecycle events
/// from more than one thread.
///
/// # Contract
///
/// Probing must be idempotent and free of side effects visible to other
/// detectors: the membership outcome for any detector must not depend on the
/// order in which the roster is probed. A detector that cannot determine
/// interest returns an error rather than guessing; the manager contains both
/// errors and panics and continues with the remaining detectors.
pub trait ExternalEditDetector: Send + Sync {
    /// Returns the unique name of this detector
    ///
    /// Used for logging, debugging, and diagnostics.
    fn name(&self) -> &str;

    /// Decides whether this detector is relevant to the newly opened
    /// document.
    fn probe(&self, document: &Document) -> Result<Probe, ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::SharedAnnotationSource;
    use url::Url;

    /// Mock detector for testing
    struct MockDetector {
        name: &'static str,
        interested: bool,
    }

    impl ExternalEditDetector for MockDetector {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self, _document: &Document) -> Result<Probe, ProbeError> {
            if self.interested {
                Ok(Probe::interested())
            } else {
                Ok(Probe::NotInterested)
            }
        }
    }

    fn test_document() -> std::sync::Arc<Document> {
        Document::new(Url::parse("file:///test.txt").unwrap(), "content")
    }

    #[test]
    fn test_probe_outcomes() {
        let document = test_document();

        let interested = MockDetector {
            name: "interested-detector",
            interested: true,
        };
        assert!(matches!(
            interested.probe(&document),
            Ok(Probe::Interested { .. })
        ));

        let not_interested = MockDetector {
            name: "not-interested-detector",
            interested: false,
        };
        assert!(matches!(
            not_interested.probe(&document),
            Ok(Probe::NotInterested)
        ));
    }

    #[test]
    fn test_probe_constructors() {
        assert!(matches!(
            Probe::interested(),
            Probe::Interested {
                annotation_source: None
            }
        ));

        let source = Arc::new(SharedAnnotationSource::new());
        match Probe::watching(source) {
            Probe::Interested { annotation_source } => {
                assert!(annotation_source.is_some(), "Source must be carried through")
            }
            Probe::NotInterested => panic!("watching() must report interest"),
        }
    }

    #[test]
    fn test_probe_error_display() {
        let err = ProbeError::MissingCapability("tag aggregator".to_string());
        assert_eq!(err.to_string(), "host capability unavailable: tag aggregator");
    }
}
