//! Annotation spans and the annotation-source contract
//!
//! An annotation source is an opaque provider of tagged regions within a
//! document. Monitors watch sources for changes that signal an edit arriving
//! outside the keystroke path. Sources are supplied by detectors at probe
//! time and consulted in detector registration order.

use std::ops::Range;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

/// A tagged region of a document, as reported by an annotation source.
///
/// `start..end` is a half-open byte range. The tag is opaque to the
/// monitoring core; it exists for logging and for consumers that want to
/// distinguish annotation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSpan {
    pub start: usize,
    pub end: usize,
    pub tag: String,
}

impl AnnotationSpan {
    pub fn new(start: usize, end: usize, tag: impl Into<String>) -> Self {
        AnnotationSpan {
            start,
            end,
            tag: tag.into(),
        }
    }
}

/// Checks if two spans overlap in byte positions.
pub fn spans_overlap(a: &AnnotationSpan, b: &AnnotationSpan) -> bool {
    // Two ranges [a_start, a_end) and [b_start, b_end) overlap if:
    // a_start < b_end AND b_start < a_end
    a.start < b.end && b.start < a.end
}

/// Deduplicates overlapping spans, keeping the first occurrence.
///
/// Spans are collected in source registration order, so the first span for
/// any overlapping area comes from the highest-priority source.
pub fn dedup_spans(spans: Vec<AnnotationSpan>) -> Vec<AnnotationSpan> {
    let mut deduplicated: Vec<AnnotationSpan> = Vec::new();

    for span in spans {
        let overlaps = deduplicated
            .iter()
            .any(|existing| spans_overlap(&span, existing));

        if !overlaps {
            deduplicated.push(span);
        } else {
            trace!(
                "Skipping overlapping span at byte {}-{} (lower priority)",
                span.start,
                span.end
            );
        }
    }

    deduplicated
}

/// Receiver of change notifications from an annotation source.
pub trait AnnotationListener: Send + Sync {
    /// Called after the source's annotations changed within `range`.
    fn annotations_changed(&self, range: Range<usize>);
}

/// Opaque provider of tagged regions within one document.
///
/// Implementations must be `Send + Sync`; a monitor may query them from a
/// scheduled check running off the notification thread.
pub trait AnnotationSource: Send + Sync {
    /// Spans currently present within `range` of the document, in position
    /// order.
    fn spans_in(&self, range: Range<usize>) -> Vec<AnnotationSpan>;

    /// Subscribes `listener` to change notifications. Dropping the returned
    /// guard unsubscribes; no notification is delivered afterwards.
    fn subscribe(&self, listener: Weak<dyn AnnotationListener>) -> Subscription;
}

/// Guard for an annotation-source subscription. Unsubscribes on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct SharedAnnotationState {
    spans: Vec<AnnotationSpan>,
    listeners: Vec<(u64, Weak<dyn AnnotationListener>)>,
    next_token: u64,
}

/// In-memory annotation source.
///
/// Hosts without a native tag store can drive one of these directly:
/// `set_spans` replaces the span set and notifies subscribers. Tests use it
/// to simulate a tool writing annotations into a buffer.
#[derive(Clone)]
pub struct SharedAnnotationSource {
    state: Arc<Mutex<SharedAnnotationState>>,
}

impl SharedAnnotationSource {
    pub fn new() -> Self {
        SharedAnnotationSource {
            state: Arc::new(Mutex::new(SharedAnnotationState {
                spans: Vec::new(),
                listeners: Vec::new(),
                next_token: 0,
            })),
        }
    }

    pub fn with_spans(spans: Vec<AnnotationSpan>) -> Self {
        let source = Self::new();
        source.state.lock().spans = spans;
        source
    }

    /// Replaces the span set and notifies live subscribers with the byte
    /// range covering both the old and new sets.
    pub fn set_spans(&self, spans: Vec<AnnotationSpan>) {
        let (changed, listeners) = {
            let mut state = self.state.lock();
            let changed = covering_range(state.spans.iter().chain(spans.iter()));
            state.spans = spans;
            state.listeners.retain(|(_, l)| l.strong_count() > 0);
            (changed, state.listeners.clone())
        };

        // Notify outside the lock so a listener may query spans_in reentrantly.
        for (_, listener) in listeners {
            if let Some(listener) = listener.upgrade() {
                listener.annotations_changed(changed.clone());
            }
        }
    }

    pub fn span_count(&self) -> usize {
        self.state.lock().spans.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .listeners
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }
}

impl Default for SharedAnnotationSource {
    fn default() -> Self {
        Self::new()
    }
}

fn covering_range<'a>(spans: impl Iterator<Item = &'a AnnotationSpan>) -> Range<usize> {
    let mut range = usize::MAX..0;
    for span in spans {
        range.start = range.start.min(span.start);
        range.end = range.end.max(span.end);
    }
    if range.start > range.end {
        0..0
    } else {
        range
    }
}

impl AnnotationSource for SharedAnnotationSource {
    fn spans_in(&self, range: Range<usize>) -> Vec<AnnotationSpan> {
        let state = self.state.lock();
        let probe = AnnotationSpan::new(range.start, range.end, "");
        state
            .spans
            .iter()
            .filter(|span| spans_overlap(span, &probe))
            .cloned()
            .collect()
    }

    fn subscribe(&self, listener: Weak<dyn AnnotationListener>) -> Subscription {
        let token = {
            let mut state = self.state.lock();
            let token = state.next_token;
            state.next_token += 1;
            state.listeners.push((token, listener));
            token
        };
        trace!("Annotation subscription added (token={})", token);

        let state = Arc::clone(&self.state);
        Subscription::new(move || {
            state.lock().listeners.retain(|(t, _)| *t != token);
            trace!("Annotation subscription removed (token={})", token);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct RecordingListener {
        ranges: PlMutex<Vec<Range<usize>>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(RecordingListener {
                ranges: PlMutex::new(Vec::new()),
            })
        }
    }

    impl AnnotationListener for RecordingListener {
        fn annotations_changed(&self, range: Range<usize>) {
            self.ranges.lock().push(range);
        }
    }

    #[test]
    fn test_spans_overlap_detection() {
        let a = AnnotationSpan::new(0, 10, "a");
        let b_overlap = AnnotationSpan::new(5, 15, "b");
        let c_disjoint = AnnotationSpan::new(20, 30, "c");
        let d_adjacent = AnnotationSpan::new(10, 12, "d");

        assert!(spans_overlap(&a, &b_overlap));
        assert!(!spans_overlap(&a, &c_disjoint));
        assert!(
            !spans_overlap(&a, &d_adjacent),
            "Half-open ranges sharing an endpoint do not overlap"
        );
    }

    #[test]
    fn test_dedup_keeps_first_on_overlap() {
        let spans = vec![
            AnnotationSpan::new(0, 10, "high"),
            AnnotationSpan::new(5, 15, "low"),
            AnnotationSpan::new(20, 30, "other"),
        ];

        let deduplicated = dedup_spans(spans);
        assert_eq!(deduplicated.len(), 2);
        assert_eq!(deduplicated[0].tag, "high");
        assert_eq!(deduplicated[1].tag, "other");
    }

    #[test]
    fn test_dedup_preserves_order_for_disjoint_spans() {
        let spans = vec![
            AnnotationSpan::new(40, 50, "c"),
            AnnotationSpan::new(0, 10, "a"),
            AnnotationSpan::new(20, 30, "b"),
        ];

        let deduplicated = dedup_spans(spans.clone());
        assert_eq!(deduplicated, spans, "Disjoint spans pass through unchanged");
    }

    #[test]
    fn test_shared_source_spans_in_range() {
        let source = SharedAnnotationSource::with_spans(vec![
            AnnotationSpan::new(0, 5, "a"),
            AnnotationSpan::new(10, 20, "b"),
        ]);

        let spans = source.spans_in(0..8);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tag, "a");

        let all = source.spans_in(0..usize::MAX);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_set_spans_notifies_subscribers() {
        let source = SharedAnnotationSource::new();
        let listener = RecordingListener::new();
        let _subscription =
            source.subscribe(Arc::downgrade(&listener) as Weak<dyn AnnotationListener>);

        source.set_spans(vec![AnnotationSpan::new(3, 9, "new")]);

        let ranges = listener.ranges.lock();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0], 3..9);
    }

    #[test]
    fn test_dropping_subscription_stops_notifications() {
        let source = SharedAnnotationSource::new();
        let listener = RecordingListener::new();
        let subscription =
            source.subscribe(Arc::downgrade(&listener) as Weak<dyn AnnotationListener>);
        assert_eq!(source.listener_count(), 1);

        drop(subscription);
        assert_eq!(source.listener_count(), 0);

        source.set_spans(vec![AnnotationSpan::new(0, 1, "x")]);
        assert!(listener.ranges.lock().is_empty());
    }
}
