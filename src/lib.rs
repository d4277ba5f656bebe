//! clusterdeck: provision workloads across many Kubernetes clusters over HTTP.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod server;
pub mod workload;

pub use error::{Error, Result};
