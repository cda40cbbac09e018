//! Front-end core of the hardware metrics dashboard: a fetcher that reads
//! the latest telemetry snapshot from an Upstash-style Redis REST store,
//! and a reactive store a UI can subscribe to.

pub mod config;
pub mod fetch;
pub mod store;
pub mod transport;
