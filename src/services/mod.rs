//! Long-lived services behind the UI: session plumbing and logging.

pub mod session;
pub mod tracing_setup;
