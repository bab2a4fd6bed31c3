//! Per-document external-edit watch
//!
//! A monitor is constructed by the manager when at least one detector opts in
//! for a newly opened document. It subscribes to the annotation sources those
//! detectors supplied, coalesces change notifications into scheduled check
//! passes, and reports external-edit transitions to the consumer listener.
//! The manager retires it when the document closes.

use std::ops::Range;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::annotations::{
    dedup_spans, spans_overlap, AnnotationListener, AnnotationSource, AnnotationSpan, Subscription,
};
use crate::detector::ExternalEditDetector;
use crate::document::{BufferHandle, Document, DocumentId};
use crate::metrics::metrics;
use crate::scheduler::CheckScheduler;

/// Transition of a document's external-edit state, as seen by one check pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEditEvent {
    /// Annotations outside the baseline appeared where there were none.
    Started { spans: Vec<AnnotationSpan> },
    /// The set of externally edited spans changed while non-empty.
    Changed { spans: Vec<AnnotationSpan> },
    /// All externally edited spans are gone.
    Ended,
}

/// Consumer of external-edit transitions, typically the modal-editing layer.
pub trait ExternalEditListener: Send + Sync {
    fn on_external_edit(&self, document: DocumentId, event: ExternalEditEvent);
}

struct MonitorState {
    /// Spans present when the watch began (or accepted since); never reported.
    ignored: Vec<AnnotationSpan>,
    /// Spans currently reported to the consumer as an external edit.
    active: Vec<AnnotationSpan>,
    check_queued: bool,
    subscriptions: Vec<Subscription>,
    retired: bool,
}

/// The active watch over one document.
///
/// Holds the ordered sublist of detectors that opted in and the annotation
/// sources they supplied; both preserve roster registration order, which is
/// the priority order when sources report overlapping spans.
pub struct ExternalEditMonitor {
    document: Arc<Document>,
    detectors: Vec<Arc<dyn ExternalEditDetector>>,
    sources: Vec<Arc<dyn AnnotationSource>>,
    text_handle: Arc<dyn BufferHandle>,
    listener: Arc<dyn ExternalEditListener>,
    scheduler: Arc<dyn CheckScheduler>,
    weak_self: Weak<ExternalEditMonitor>,
    state: Mutex<MonitorState>,
}

impl ExternalEditMonitor {
    /// Constructs the monitor, snapshots the baseline annotation spans, and
    /// subscribes to every annotation source.
    pub fn start(
        document: Arc<Document>,
        detectors: Vec<Arc<dyn ExternalEditDetector>>,
        sources: Vec<Arc<dyn AnnotationSource>>,
        text_handle: Arc<dyn BufferHandle>,
        listener: Arc<dyn ExternalEditListener>,
        scheduler: Arc<dyn CheckScheduler>,
    ) -> Arc<Self> {
        let monitor = Arc::new_cyclic(|weak| ExternalEditMonitor {
            document,
            detectors,
            sources,
            text_handle,
            listener,
            scheduler,
            weak_self: weak.clone(),
            state: Mutex::new(MonitorState {
                ignored: Vec::new(),
                active: Vec::new(),
                check_queued: false,
                subscriptions: Vec::new(),
                retired: false,
            }),
        });

        // Annotations that predate the watch never count as an external edit.
        let baseline = monitor.collect_spans();
        let listener_ref =
            Arc::downgrade(&monitor) as Weak<dyn AnnotationListener>;
        let subscriptions: Vec<Subscription> = monitor
            .sources
            .iter()
            .map(|source| source.subscribe(listener_ref.clone()))
            .collect();

        {
            let mut state = monitor.state.lock();
            state.ignored = baseline;
            state.subscriptions = subscriptions;
        }

        debug!(
            "Monitor started for {}: {} detectors, {} annotation sources, {} baseline spans",
            monitor.document.id,
            monitor.detectors.len(),
            monitor.sources.len(),
            monitor.state.lock().ignored.len()
        );
        metrics().record_monitor_created();

        monitor
    }

    pub fn document_id(&self) -> DocumentId {
        self.document.id
    }

    /// Names of the interested detectors, in roster registration order.
    pub fn detector_names(&self) -> Vec<String> {
        self.detectors
            .iter()
            .map(|detector| detector.name().to_string())
            .collect()
    }

    /// Number of annotation sources under watch.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The storage handle resolved for this document, passed through
    /// unexamined from the host's adapter.
    pub fn text_handle(&self) -> &Arc<dyn BufferHandle> {
        &self.text_handle
    }

    /// Spans currently reported to the consumer as an external edit.
    pub fn active_spans(&self) -> Vec<AnnotationSpan> {
        self.state.lock().active.clone()
    }

    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }

    /// Tears down the watch: drops annotation subscriptions and silences any
    /// still-queued check. Idempotent; emits no event, the document is going
    /// away.
    pub fn retire(&self) {
        let subscriptions = {
            let mut state = self.state.lock();
            if state.retired {
                return;
            }
            state.retired = true;
            state.active.clear();
            std::mem::take(&mut state.subscriptions)
        };
        // Unsubscribe outside the state lock.
        drop(subscriptions);

        metrics().record_monitor_retired();
        debug!("Monitor retired for {}", self.document.id);
    }

    /// Runs one check pass: collects current spans from all sources in
    /// priority order, subtracts the baseline, and reports at most one
    /// transition to the consumer.
    pub fn perform_check(&self) {
        {
            let mut state = self.state.lock();
            if state.retired {
                return;
            }
            // Cleared before collection so a change arriving mid-collection
            // queues a fresh check rather than being lost.
            state.check_queued = false;
        }

        let started_at = Instant::now();
        let current = dedup_spans(self.collect_spans());

        let event = {
            let mut state = self.state.lock();
            if state.retired {
                return;
            }

            // An ignored span is forgotten once it no longer overlaps any
            // current span; if the same region is annotated again later, that
            // is a new external edit.
            state
                .ignored
                .retain(|ignored| current.iter().any(|span| spans_overlap(span, ignored)));

            let fresh: Vec<AnnotationSpan> = current
                .into_iter()
                .filter(|span| {
                    !state
                        .ignored
                        .iter()
                        .any(|ignored| spans_overlap(span, ignored))
                })
                .collect();

            if fresh == state.active {
                None
            } else {
                let event = match (state.active.is_empty(), fresh.is_empty()) {
                    (true, _) => ExternalEditEvent::Started {
                        spans: fresh.clone(),
                    },
                    (false, true) => ExternalEditEvent::Ended,
                    (false, false) => ExternalEditEvent::Changed {
                        spans: fresh.clone(),
                    },
                };
                state.active = fresh;
                Some(event)
            }
        };

        metrics().record_check();
        metrics().record_timing("monitor_check", started_at.elapsed());

        if let Some(event) = event {
            metrics().record_external_edit();
            debug!("External edit transition for {}: {:?}", self.document.id, event);
            self.listener.on_external_edit(self.document.id, event);
        }
    }

    /// Current spans from every source, in source (detector priority) order.
    fn collect_spans(&self) -> Vec<AnnotationSpan> {
        let mut spans = Vec::new();
        for source in &self.sources {
            spans.extend(source.spans_in(0..usize::MAX));
        }
        spans
    }
}

impl AnnotationListener for ExternalEditMonitor {
    fn annotations_changed(&self, range: Range<usize>) {
        {
            let mut state = self.state.lock();
            if state.retired || state.check_queued {
                return;
            }
            state.check_queued = true;
        }
        trace!(
            "Annotations changed for {} in {}..{}, check queued",
            self.document.id,
            range.start,
            range.end
        );

        let weak = self.weak_self.clone();
        self.scheduler.schedule(Box::new(move || {
            if let Some(monitor) = weak.upgrade() {
                monitor.perform_check();
            }
        }));
    }
}

impl std::fmt::Debug for ExternalEditMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalEditMonitor")
            .field("document", &self.document.id)
            .field("detectors", &self.detector_names())
            .field("sources", &self.sources.len())
            .field("retired", &self.is_retired())
            .finish()
    }
}
