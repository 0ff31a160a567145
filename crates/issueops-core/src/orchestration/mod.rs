//! Main and post phases of a deployment run.

pub mod messages;
pub mod post;
pub mod run;

pub use post::{PostPhase, PostReport};
pub use run::{Collaborators, DeploymentOrchestrator};
