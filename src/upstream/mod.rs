//! Upstream: C3 probe and C6 proxy engine, built on the shared hyper client.

pub mod probe;
pub mod proxy;

pub use probe::{probe, ProbeResult};
pub use proxy::{forward, ForwardRequest, Outcome};
