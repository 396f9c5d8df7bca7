//! CLI library components for the sharing tool.

pub mod logging;
