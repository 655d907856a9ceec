//! Observability setup for Chatloom.

pub mod tracing_setup;
