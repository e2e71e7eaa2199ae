// === Serialized Node Facade ===
pub mod node;

pub use node::{EventRecord, NodeError, NodeSummary, SkysuretyNode};
