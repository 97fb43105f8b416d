use std::sync::{Mutex, PoisonError};

use warden_core::contracts::AuditRecord;
use warden_core::errors::AuditError;
use warden_core::traits::AuditSink;

/// Keeps records in memory, in append order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Sink that rejects every write after the first `succeed` appends.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingAuditSink {
    succeed: usize,
    inner: MemoryAuditSink,
    attempts: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FailingAuditSink {
    pub(crate) fn after(succeed: usize) -> Self {
        Self {
            succeed,
            ..Self::default()
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub(crate) fn records(&self) -> Vec<AuditRecord> {
        self.inner.records()
    }
}

#[cfg(test)]
impl AuditSink for FailingAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let n = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n >= self.succeed {
            return Err(AuditError::WriteFailure("disk full".into()));
        }
        self.inner.append(record)
    }
}
