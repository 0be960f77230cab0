//! Suggestion generation pipeline.
//!
//! - [`runner::PipelineRunner`] executes one suggestion's stages under its
//!   execution lock and records every transition in the job store.
//! - [`dispatcher`] is the fire-and-forget trigger path: a bounded queue
//!   drained by a worker pool.
//! - [`service::GenerationService`] ties job creation, suggestion text
//!   ([`advisor`]) and triggering together for the HTTP layer.

pub mod advisor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod runner;
pub mod service;

pub use advisor::{StyleAdvisor, TemplateAdvisor};
pub use config::PipelineConfig;
pub use dispatcher::{Dispatcher, GenerationQueue, GenerationRequest};
pub use error::PipelineError;
pub use runner::{PipelineRunner, RunOutcome, SkipReason};
pub use service::GenerationService;
