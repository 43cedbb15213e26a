//! Art Queue: asynchronous image-generation task orchestration.

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod poller;
pub mod storage;
pub mod store;
pub mod tasks;
pub mod worker;
