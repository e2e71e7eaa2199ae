// === Airline Admission Consensus ===
pub mod admission;

pub use admission::{
    AdmissionError, AdmissionOutcome, AdmissionStatus, AirlineAccount, AirlineRegistry,
    VerificationReceipt,
};
