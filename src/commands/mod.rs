//! Command handlers.
//!
//! Plain async functions over the stores and services, called by the CLI.
//! Commands are organized by functionality:
//! - `projects`: add, connect, remove and list monitored projects
//! - `settings`: poll interval and notification preferences
//! - `status`: the pull request list from the last poll
//! - `sync`: on-demand polls and merge acknowledgment

pub mod projects;
pub mod settings;
pub mod status;
pub mod sync;

pub use projects::{add_project, connect_project, list_projects, remove_project, AddProjectInput};
pub use settings::{get_settings, set_notifications_enabled, set_poll_interval};
pub use status::get_status;
pub use sync::{ack_merges, poll_now};
