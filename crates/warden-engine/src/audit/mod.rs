//! Audit subsystem: append-only sinks and chain verification.

pub mod jsonl;
pub mod memory;
pub mod trail;

pub use jsonl::{verify_chain, ChainSummary, JsonlAuditSink};
pub use memory::MemoryAuditSink;
pub use trail::AuditTrail;
