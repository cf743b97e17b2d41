//! Release channel server.
//!
//! Serves versioned release channel metadata over a read-only HTTP API. Channel
//! definitions come from one or more remote YAML documents that are re-fetched
//! on a timer; every refresh produces a new immutable [`snapshot::Snapshot`]
//! that replaces the previous one atomically, and requests are answered from
//! memory. Channels may stage a new release to a percentage of clients, chosen
//! deterministically from the client identity (see [`rollout`]).

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod rollout;
pub mod snapshot;
pub mod source;
pub mod subscription;
pub mod views;
