//! Content synchronisation engine
//!
//! Leaf-first: `interpreter`, `taxonomy` and `media` resolve remote
//! identifiers, `pipeline` runs them for one target, and `orchestrator`
//! fans an item out across targets in the configured dispatch mode.

pub mod errors;
pub mod interpreter;
pub mod maintenance;
pub mod media;
pub mod orchestrator;
pub mod payload;
pub mod pipeline;
pub mod ports;
pub mod report;
pub mod targets;
pub mod taxonomy;
