//! Data models for the application.
//!
//! `azure` holds the wire payloads returned by the Azure DevOps REST API.
//! The remaining modules are the poller's own normalized state.

pub mod azure;
pub mod change_event;
pub mod poll_state;
pub mod seen_record;
pub mod settings;
pub mod snapshot;

// Re-exports for convenient access
pub use azure::{
    GitPullRequest, GitPullRequestStatus, MergeStatus, PullRequestStatus, ReviewerVote,
    StatusState,
};
pub use change_event::{ChangeEvent, ChangeType, Severity};
pub use poll_state::PollState;
pub use seen_record::{LifecycleState, SeenPrRecord};
pub use settings::{ProjectConfig, Settings};
pub use snapshot::{PrIdentity, PrSnapshot};
