//! Upstream weather API forwarding

pub mod forwarder;

pub use forwarder::UpstreamForwarder;
