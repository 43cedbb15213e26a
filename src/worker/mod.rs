//! Task execution.
//!
//! - `worker`: runs one task end to end: dedup guard, staged progress,
//!   generation timeout, result normalization, retry bookkeeping
//!
//! Submission, retry, cancel and recovery re-dispatch go through `Worker`.

pub mod worker;

pub use worker::{ExecutionOutcome, Worker, WorkerDeps};
