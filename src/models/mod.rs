//! Domain models for the channel server.
//!
//! # Core Concepts
//!
//! - [`SourceDocument`]: one decoded YAML document as fetched from a source URL.
//!   Documents are merged in configuration order, later ones replacing earlier
//!   definitions with the same key.
//! - [`Channel`]: a named rollout target. It resolves to its primary (`latest`)
//!   release, or to one of its [`RolloutRule`] targets for a stable subset of clients.
//! - [`Release`]: a version entry referenced by channels. Everything besides the
//!   version is opaque metadata that is served verbatim.

mod channel;
mod document;
mod release;

pub use channel::*;
pub use document::*;
pub use release::*;
