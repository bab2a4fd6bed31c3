#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use external_edit_monitor::annotations::SharedAnnotationSource;
use external_edit_monitor::detector::{ExternalEditDetector, Probe, ProbeError};
use external_edit_monitor::document::{Document, DocumentId};
use external_edit_monitor::monitor::{ExternalEditEvent, ExternalEditListener};
use external_edit_monitor::scheduler::{Check, CheckScheduler};

/// Detector with a scripted probe outcome, optionally supplying an
/// annotation source.
pub struct ScriptedDetector {
    pub name: String,
    pub interested: bool,
    pub source: Option<Arc<SharedAnnotationSource>>,
}

impl ScriptedDetector {
    pub fn interested(name: &str) -> Arc<Self> {
        Arc::new(ScriptedDetector {
            name: name.to_string(),
            interested: true,
            source: None,
        })
    }

    pub fn not_interested(name: &str) -> Arc<Self> {
        Arc::new(ScriptedDetector {
            name: name.to_string(),
            interested: false,
            source: None,
        })
    }

    pub fn watching(name: &str, source: Arc<SharedAnnotationSource>) -> Arc<Self> {
        Arc::new(ScriptedDetector {
            name: name.to_string(),
            interested: true,
            source: Some(source),
        })
    }
}

impl ExternalEditDetector for ScriptedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, _document: &Document) -> Result<Probe, ProbeError> {
        if !self.interested {
            return Ok(Probe::NotInterested);
        }
        match &self.source {
            Some(source) => Ok(Probe::watching(source.clone())),
            None => Ok(Probe::interested()),
        }
    }
}

/// Detector whose probe always reports an error.
pub struct FailingDetector {
    pub name: &'static str,
}

impl ExternalEditDetector for FailingDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self, _document: &Document) -> Result<Probe, ProbeError> {
        Err(ProbeError::MissingCapability("tag aggregator".to_string()))
    }
}

/// Detector whose probe always panics.
pub struct PanickingDetector {
    pub name: &'static str,
}

impl ExternalEditDetector for PanickingDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self, _document: &Document) -> Result<Probe, ProbeError> {
        panic!("misbehaving detector")
    }
}

/// Listener that records every external-edit transition it receives.
pub struct RecordingListener {
    events: Mutex<Vec<(DocumentId, ExternalEditEvent)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingListener {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<(DocumentId, ExternalEditEvent)> {
        self.events.lock().clone()
    }
}

impl ExternalEditListener for RecordingListener {
    fn on_external_edit(&self, document: DocumentId, event: ExternalEditEvent) {
        self.events.lock().push((document, event));
    }
}

/// Scheduler that queues checks until the test drains them.
pub struct QueueScheduler {
    queued: Mutex<Vec<Check>>,
}

impl QueueScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(QueueScheduler {
            queued: Mutex::new(Vec::new()),
        })
    }

    pub fn queued_count(&self) -> usize {
        self.queued.lock().len()
    }

    pub fn run_all(&self) {
        let checks = std::mem::take(&mut *self.queued.lock());
        for check in checks {
            check();
        }
    }
}

impl CheckScheduler for QueueScheduler {
    fn schedule(&self, check: Check) {
        self.queued.lock().push(check);
    }
}

pub fn test_document(name: &str, text: &str) -> Arc<Document> {
    Document::new(
        Url::parse(&format!("file:///{}", name)).expect("valid test URI"),
        text,
    )
}
