// === Pseudo-Random Index Assignment ===
pub mod indexes;

// === Request / Response Consensus ===
pub mod consensus;

pub use consensus::{
    derive_request_key, OpenedRequest, OracleAccount, OracleConsensus, OracleError, Resolution,
    ResponseOutcome, StatusRequest,
};
pub use indexes::IndexGenerator;
