//! Audit sink implementations.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::RwLock;
use std::thread::JoinHandle;

use super::{AuditRecord, AuditSink, AuditSinkError, RejectionRecord};
use crate::error::Result;
use crate::security::{DetectionEvent, Severity};

/// Writes records as structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn write(&self, record: &AuditRecord) -> std::result::Result<(), AuditSinkError> {
        match record {
            AuditRecord::Detection(event) => tracing::warn!(
                target: "jobguard::audit",
                source = %event.source,
                pattern = %event.pattern_label,
                category = %event.category,
                severity = %event.severity,
                offset = event.offset,
                sample = %event.text_sample,
                "injection pattern detected"
            ),
            AuditRecord::Rejection(rejection) if rejection.severity == Severity::Critical => {
                tracing::error!(
                    target: "jobguard::audit",
                    kind = rejection.error.kind(),
                    batch_id = rejection.batch_id.as_deref().unwrap_or("-"),
                    "response rejected: {}",
                    rejection.error
                );
            },
            AuditRecord::Rejection(rejection) => tracing::warn!(
                target: "jobguard::audit",
                kind = rejection.error.kind(),
                batch_id = rejection.batch_id.as_deref().unwrap_or("-"),
                "response rejected: {}",
                rejection.error
            ),
        }
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemorySink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Snapshot of detection events
    pub fn detections(&self) -> Vec<DetectionEvent> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Detection(event) => Some(event),
                AuditRecord::Rejection(_) => None,
            })
            .collect()
    }

    /// Snapshot of rejections
    pub fn rejections(&self) -> Vec<RejectionRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                AuditRecord::Rejection(rejection) => Some(rejection),
                AuditRecord::Detection(_) => None,
            })
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// No records yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write(&self, record: &AuditRecord) -> std::result::Result<(), AuditSinkError> {
        self.records
            .write()
            .map_err(|_| AuditSinkError::Poisoned)?
            .push(record.clone());
        Ok(())
    }
}

/// Appends records as JSON lines from a background thread.
///
/// `write` only serializes and enqueues. When the bounded queue is full the
/// record is dropped and counted instead of stalling the caller. Dropping the
/// sink drains the queue and joins the writer.
#[derive(Debug)]
pub struct JsonlSink {
    sender: Option<SyncSender<String>>,
    writer: Option<JoinHandle<()>>,
    dropped: AtomicU64,
}

impl JsonlSink {
    /// Open `path` for appending and start the writer thread
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));

        let writer = std::thread::Builder::new()
            .name("jobguard-audit".to_string())
            .spawn(move || write_lines(file, &receiver))?;

        Ok(Self {
            sender: Some(sender),
            writer: Some(writer),
            dropped: AtomicU64::new(0),
        })
    }

    /// Records dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn write_lines(file: File, receiver: &mpsc::Receiver<String>) {
    let mut out = BufWriter::new(file);
    for line in receiver {
        let result = writeln!(out, "{line}").and_then(|()| out.flush());
        if let Err(e) = result {
            tracing::warn!("audit log write failed: {e}");
        }
    }
}

impl AuditSink for JsonlSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write(&self, record: &AuditRecord) -> std::result::Result<(), AuditSinkError> {
        let line = serde_json::to_string(record)?;
        let sender = self.sender.as_ref().ok_or(AuditSinkError::Closed)?;
        match sender.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AuditSinkError::Full)
            },
            Err(TrySendError::Disconnected(_)) => Err(AuditSinkError::Closed),
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop once the queue drains.
        self.sender.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}
