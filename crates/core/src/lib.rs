//! Domain model and pure logic shared by every Drape crate.
//!
//! Nothing in here performs I/O: the job/suggestion state machine, prompt
//! assembly, artifact naming and input validation are all plain functions
//! so the stores, the pipeline and the status client agree on one set of
//! rules.

pub mod error;
pub mod generation;
pub mod job;
pub mod job_events;
pub mod naming;
pub mod prompt;
pub mod types;
