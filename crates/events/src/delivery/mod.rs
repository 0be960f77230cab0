//! Outbound delivery of finished generations.
//!
//! The gallery store that keeps a user's past looks lives outside this
//! service; [`gallery::GallerySink`] is its interface and
//! [`webhook::WebhookGallery`] the HTTP implementation.

pub mod gallery;
pub mod webhook;
