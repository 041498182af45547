pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod locks;
pub mod retention;
pub mod splitter;

#[cfg(test)]
mod tests;

// Re-export main types
pub use collaborators::{
    CollaboratorError, ExecOutcome, Executor, InspectOutcome, Inspector, InstanceRegistry,
    RollbackGenerator, SplitError, SqlSplitter,
};
pub use coordinator::{
    BuilderError, CoordinatorConfig, LifecycleCoordinator, LifecycleCoordinatorBuilder,
};
pub use error::{CoordinatorError, ErrorKind, ValidationError};
pub use gate::{check_delete, evaluate, ActionGate, GateRejection};
pub use locks::{TaskGuard, TaskLocks};
pub use retention::{RetentionPolicy, RetentionReport, RetentionSweeper};
pub use splitter::TerminatorSplitter;
