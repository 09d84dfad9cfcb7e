pub mod engine;
pub mod gateway;
pub mod identity;
pub mod notice;
pub mod persistence;
pub mod queue;
pub mod sequencer;
pub mod task;
pub mod theme;

pub use engine::{Intent, Outcome, Reconciliation, ReconciliationEngine, SyncOutcome};
pub use gateway::{Payload, RemoteGateway};
pub use notice::{Notice, NoticeKind};
pub use persistence::{LocalStore, Snapshot};
pub use queue::ReconcileQueue;
pub use task::{CreateTaskRequest, Task, TaskFilter, UpdateTaskRequest};
pub use theme::Theme;
