//! Coaching intake branching, packet rendering, and the packet-generation job pipeline.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
