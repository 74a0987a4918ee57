//! Immutable state layer: copy-on-write value objects and their owner.

pub mod application;
pub mod manager;
pub mod session;

pub use application::{
    ApplicationState, CacheStats, ModuleState, ModuleStatus, PerformanceMetrics, StateSummary,
};
pub use manager::{StateManager, StateSnapshot, SNAPSHOT_VERSION};
pub use session::{
    OperationRecord, SessionOptions, SessionState, DEFAULT_MAX_HISTORY, DEFAULT_TIMEOUT_MS,
};
