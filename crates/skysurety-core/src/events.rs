/// LEDGER EVENTS
///
/// Every observable state transition is reported as exactly one event.
/// External populations (airlines, oracle operators, passengers) watch this
/// stream; oracle operators in particular react to `StatusRequested`.

use crate::types::{Address, FlightStatus, RequestKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// An airline entered the registered set, via the fast path, consensus
    /// vote, or genesis. Emitted exactly once per airline.
    AirlineAdmitted {
        airline: Address,
        votes: usize,
        via_consensus: bool,
    },
    /// A registered airline cast a vote for a pending candidate.
    VoteRecorded {
        candidate: Address,
        voter: Address,
        votes: usize,
    },
    /// An airline paid the verification fee and may now sell insurance.
    AirlineVerified { airline: Address, fee: u128 },
    /// A passenger bought a policy; `premium` is the charged (capped) amount.
    PolicyPurchased {
        airline: Address,
        passenger: Address,
        premium: u128,
    },
    OracleRegistered { oracle: Address, indexes: [u8; 3] },
    /// A flight-status request opened. Oracles holding `index` are expected
    /// to respond.
    StatusRequested {
        key: RequestKey,
        index: u8,
        airline: Address,
        flight: String,
        timestamp: u64,
    },
    ResponseRecorded {
        key: RequestKey,
        oracle: Address,
        status: FlightStatus,
        tally: usize,
    },
    /// Majority reached. Emitted exactly once per request.
    FlightStatusResolved {
        key: RequestKey,
        airline: Address,
        flight: String,
        timestamp: u64,
        status: FlightStatus,
    },
    /// An insured passenger was credited from the airline escrow.
    PayoutCredited {
        airline: Address,
        passenger: Address,
        amount: u128,
    },
    FundsWithdrawn { passenger: Address, amount: u128 },
}
