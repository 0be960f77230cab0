//! Client side of the status-polling contract.
//!
//! - [`StatusPoller`] watches one job at a time, fetching snapshots through
//!   a [`JobFetcher`] and reporting changes to a [`PollObserver`].
//! - [`diff_suggestions`] turns two snapshots into per-suggestion
//!   [`SuggestionEvent`]s.
//! - [`HttpStatusClient`] fetches snapshots from the HTTP API.

pub mod error;
pub mod events;
pub mod fetcher;
pub mod poller;

pub use error::ClientError;
pub use events::{diff_suggestions, SuggestionEvent};
pub use fetcher::{HttpStatusClient, JobFetcher};
pub use poller::{PollExit, PollObserver, PollState, PollerConfig, StatusPoller};
