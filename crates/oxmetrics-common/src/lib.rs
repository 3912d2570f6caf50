//! Types shared by the oxmetrics agent and server.
//!
//! [`types::Metric`] is the domain value held by every storage backend.
//! [`types::MetricPayload`] is its JSON wire form, carrying an optional
//! integrity tag computed by [`hash::integrity_tag`].

pub mod env;
pub mod hash;
pub mod types;
