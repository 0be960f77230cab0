//! Drape event bus and outbound delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`GenerationEvent`]: the job/suggestion lifecycle event envelope.
//! - [`EventLog`]: background subscriber writing every event to the log.
//! - [`delivery`]: the gallery sink that receives finished looks.

pub mod bus;
pub mod delivery;
pub mod log;

pub use bus::{EventBus, GenerationEvent};
pub use delivery::gallery::{GalleryError, GalleryOriginals, GalleryRecord, GallerySink, MemoryGallery, NoopGallery};
pub use delivery::webhook::WebhookGallery;
pub use log::EventLog;
