//! Task records, their lifecycle and the queue service that owns them.

pub mod model;
pub mod service;
pub mod state;
pub mod store;
pub mod sweep;

pub use model::{
    GenerationMode, PaymentTier, Task, TaskMeta, TaskParams, TaskResult, TaskSnapshot, TaskUpdate,
};
pub use service::{QueueStats, TaskQueueService};
pub use state::TaskStatus;
pub use store::TaskStore;
pub use sweep::ExpirySweep;
