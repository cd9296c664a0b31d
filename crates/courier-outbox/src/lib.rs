//! Courier Outbox - Background delivery of staged outbox messages.

pub mod sink;
pub mod worker;

pub use sink::{LogSink, MessageSink};
pub use worker::{BatchOutcome, OutboxError, OutboxWorker, WorkerConfig, WorkerHandle, WorkerTotals};
