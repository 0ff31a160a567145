//! IssueOps Core Library
//!
//! Coordinates deployments requested through pull request comments:
//! parses the comment into a single command, serializes deployments per
//! environment with ref-backed locks, and drives the external permission,
//! precheck and deployment collaborators to one terminal outcome.

pub mod command;
pub mod config;
pub mod context;
pub mod gates;
pub mod github;
pub mod lock;
pub mod orchestration;
pub mod report;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ActionConfig, RequiredContexts};

    // Commands
    pub use crate::command::{Command, CommandKind, CommandParser, ParseError};

    // Event payload
    pub use crate::context::{CommentEvent, EventContext};

    // Locks
    pub use crate::lock::{
        AcquireOutcome, LockCoordinator, LockError, LockRecord, LockRequest, LockScope, LockStore,
        ReleaseOutcome,
    };

    // Collaborators
    pub use crate::gates::{
        CommentApi, DeployApi, DeploymentCreated, DeploymentRequest, DeploymentState,
        PermissionVerdict, PermissionsGate, PrecheckGate, PrecheckResult,
    };

    // Orchestration
    pub use crate::orchestration::{Collaborators, DeploymentOrchestrator, PostPhase};

    // Reporting
    pub use crate::report::{ActionsWriter, RunReport, SavedState};
    pub use crate::types::{JobStatus, RunOutcome};
}
