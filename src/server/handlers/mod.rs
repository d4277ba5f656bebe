//! HTTP handlers, one module per resource family

pub mod clusters;
pub mod configmaps;
pub mod deployments;
pub mod health;
pub mod pods;
pub mod secrets;
