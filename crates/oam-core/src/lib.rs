//! Ambient stack shared by every crate in the workspace: well-known label
//! and annotation keys, duration/timestamp parsing for the restart-workflow
//! annotation, telemetry bootstrap, and CLI scaffolding.

pub mod cli;
pub mod kvp;
pub mod merge;
pub mod telemetry;
pub mod time;
