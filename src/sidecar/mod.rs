//! Analytics sidecar: an opaque HTTP collaborator that prices options.

pub mod client;
pub mod types;

pub use client::AnalyticsClient;
