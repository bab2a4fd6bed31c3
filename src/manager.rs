//! Singleton coordinator for external-edit monitoring
//!
//! Owns the immutable detector roster for the editing session and the
//! document-to-monitor mapping. The host drives it with exactly two lifecycle
//! calls per document: `on_document_opened` and `on_document_closed`. Neither
//! ever fails visibly; every probe error, probe panic, and handle-resolution
//! failure is contained here so a misbehaving detector cannot destabilize
//! document creation or the other detectors.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info, trace, warn};

use crate::annotations::AnnotationSource;
use crate::config::{ManagerConfig, ReopenPolicy};
use crate::detector::{ExternalEditDetector, Probe};
use crate::document::{Document, DocumentId, TextHandleResolver};
use crate::metrics::metrics;
use crate::monitor::{ExternalEditListener, ExternalEditMonitor};
use crate::scheduler::CheckScheduler;

pub struct ExternalEditManager {
    detectors: Vec<Arc<dyn ExternalEditDetector>>,
    resolver: Arc<dyn TextHandleResolver>,
    listener: Arc<dyn ExternalEditListener>,
    scheduler: Arc<dyn CheckScheduler>,
    config: ManagerConfig,
    monitors: DashMap<DocumentId, Arc<ExternalEditMonitor>>,
}

impl ExternalEditManager {
    /// Takes ownership of the full detector roster for the session. The
    /// roster is immutable after construction; detectors are probed in the
    /// order given here.
    pub fn new(
        detectors: Vec<Arc<dyn ExternalEditDetector>>,
        resolver: Arc<dyn TextHandleResolver>,
        listener: Arc<dyn ExternalEditListener>,
        scheduler: Arc<dyn CheckScheduler>,
        config: ManagerConfig,
    ) -> Self {
        debug!(
            "External edit manager created with {} detectors: {:?}",
            detectors.len(),
            detectors.iter().map(|d| d.name()).collect::<Vec<_>>()
        );
        ExternalEditManager {
            detectors,
            resolver,
            listener,
            scheduler,
            config,
            monitors: DashMap::new(),
        }
    }

    /// Probes every registered detector against the newly opened document
    /// and, if any opted in, constructs and registers a monitor for it.
    ///
    /// Never fails visibly to the caller: this sits on the host's
    /// document-open notification path.
    pub fn on_document_opened(&self, document: &Arc<Document>) {
        let id = document.id;

        if self.config.reopen_policy == ReopenPolicy::RetireFirst {
            if let Some((_, prior)) = self.monitors.remove(&id) {
                warn!("Document {} reopened; retiring its previous monitor", id);
                prior.retire();
            }
        }

        let mut interested: Vec<Arc<dyn ExternalEditDetector>> = Vec::new();
        let mut sources: Vec<Arc<dyn AnnotationSource>> = Vec::new();

        for detector in &self.detectors {
            metrics().record_probe();
            let outcome = catch_unwind(AssertUnwindSafe(|| detector.probe(document)));
            match outcome {
                Ok(Ok(Probe::Interested { annotation_source })) => {
                    trace!("Detector '{}' interested in {}", detector.name(), id);
                    interested.push(Arc::clone(detector));
                    if let Some(source) = annotation_source {
                        sources.push(source);
                    }
                }
                Ok(Ok(Probe::NotInterested)) => {
                    trace!("Detector '{}' not interested in {}", detector.name(), id);
                }
                Ok(Err(e)) => {
                    // Unable to evaluate interest is not interest.
                    metrics().record_probe_failure();
                    warn!(
                        "Detector '{}' failed to probe {}: {}",
                        detector.name(),
                        id,
                        e
                    );
                }
                Err(_) => {
                    metrics().record_probe_panic();
                    warn!(
                        "Detector '{}' panicked while probing {}; treating as not interested",
                        detector.name(),
                        id
                    );
                }
            }
        }

        if interested.is_empty() {
            debug!("No detector interested in {}; no monitor created", id);
            return;
        }

        let text_handle = match self.resolver.resolve(document) {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    "Failed to resolve text handle for {}; no monitor created: {}",
                    id, e
                );
                return;
            }
        };

        info!(
            "Monitoring {} with {} of {} detectors ({} annotation sources)",
            id,
            interested.len(),
            self.detectors.len(),
            sources.len()
        );

        let monitor = ExternalEditMonitor::start(
            Arc::clone(document),
            interested,
            sources,
            text_handle,
            Arc::clone(&self.listener),
            Arc::clone(&self.scheduler),
        );

        if let Some(prior) = self.monitors.insert(id, monitor) {
            // Overwrite policy: last write wins, as the historical behavior.
            warn!("Replaced existing monitor for {} (last write wins)", id);
            drop(prior);
        }
    }

    /// Removes and retires the document's monitor. The sole destruction path
    /// for a monitor; a close without a mapping entry is a harmless no-op.
    pub fn on_document_closed(&self, id: DocumentId) {
        match self.monitors.remove(&id) {
            Some((_, monitor)) => {
                monitor.retire();
                info!("Stopped monitoring {} (document closed)", id);
            }
            None => {
                trace!("Close for unmonitored {}; nothing to do", id);
            }
        }
    }

    /// Number of documents currently monitored.
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Whether the document currently has an active monitor.
    pub fn is_monitoring(&self, id: DocumentId) -> bool {
        self.monitors.contains_key(&id)
    }

    /// The monitor for a document, if one is active.
    pub fn monitor(&self, id: DocumentId) -> Option<Arc<ExternalEditMonitor>> {
        self.monitors.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of all registered detectors in probe order.
    pub fn detector_names(&self) -> Vec<String> {
        self.detectors
            .iter()
            .map(|detector| detector.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for ExternalEditManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalEditManager")
            .field("detectors", &self.detector_names())
            .field("monitors", &self.monitors.len())
            .field("config", &self.config)
            .finish()
    }
}
