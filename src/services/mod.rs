//! Business logic services.
//!
//! This module contains the poll engine and everything it drives: the Azure
//! DevOps client, snapshot building, diffing, merge resolution, seen-history
//! and the persistence and notification seams.
//!
//! Services are designed to be testable through the trait seams
//! (`PullRequestSource`, `PollStateStore`, `NotificationSink`, `SummarySink`).

pub mod azure_client;
pub mod badge;
pub mod fetcher;
pub mod merge_resolver;
pub mod notifier;
pub mod poll_engine;
pub mod poller;
pub mod seen_history;
pub mod settings_store;
pub mod snapshot_builder;
pub mod state_diff;
pub mod state_store;
pub mod url_builder;

pub use azure_client::AzureDevOpsClient;
pub use fetcher::{AzureDevOpsSource, PullRequestSource};
pub use poll_engine::{PollEngine, PollHandle};
pub use poller::{CycleReport, Poller};
pub use settings_store::SettingsStore;
pub use state_store::{PollStateStore, SqliteStateStore};
