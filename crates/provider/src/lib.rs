//! Image-generation providers.
//!
//! Layers, bottom-up:
//!
//! - [`executor::TaskExecutor`] drives one remote task through
//!   submit → poll → terminal against a [`executor::TaskBackend`]
//!   ([`api::HttpTaskApi`] in production).
//! - [`adapter::ProviderAdapter`] turns pipeline stages into provider
//!   requests and persists every artifact through [`storage::BlobStore`].
//! - [`registry::ProviderRegistry`] selects an adapter per job.

pub mod adapter;
pub mod api;
pub mod backoff;
pub mod error;
pub mod executor;
pub mod image;
pub mod multimodal;
pub mod registry;
pub mod storage;
pub mod tryon;

pub use adapter::{ArtifactSink, PromptInput, ProviderAdapter, StageContext, StylizeOutput};
pub use error::ProviderError;
pub use executor::{Artifact, ExecutorConfig, TaskBackend, TaskExecutor, TaskPoll};
pub use registry::{ProviderConfig, ProviderRegistry};
