/// SKYSURETY NODE
///
/// Single serialization point for the whole ledger: the admission registry,
/// the oracle subsystem and the escrow ledger live behind one write lock,
/// so every mutating operation executes with total ordering and no
/// interleaving. Read-only queries take the read lock against a consistent
/// snapshot.
///
/// The node also wires the cross-component flows: a verification fee is
/// credited to escrow in the same critical section that marks the airline
/// verified, and an airline-fault resolution from the oracle subsystem
/// drives the payout sweep before the lock is released.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use skysurety_core::{
    Address, FlightStatus, LedgerEvent, ParamsError, ProtocolParams, RequestKey,
};
use skysurety_ledger::{EscrowLedger, FundsFlow, LedgerError, SweepReport};
use skysurety_oracle::{OracleConsensus, OracleError, StatusRequest};
use skysurety_registry::{AdmissionError, AdmissionStatus, AirlineRegistry};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Invalid parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("Airline is not verified and cannot sell insurance")]
    AirlineNotEligible,
}

/// One entry of the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    pub event: LedgerEvent,
}

/// Condensed node state for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub registered_airlines: usize,
    pub votes_required: usize,
    pub oracle_count: usize,
    pub open_requests: usize,
    pub funds: FundsFlow,
    pub events: usize,
}

#[derive(Debug)]
struct NodeState {
    registry: AirlineRegistry,
    oracle: OracleConsensus,
    ledger: EscrowLedger,
    events: Vec<EventRecord>,
}

impl NodeState {
    fn record(&mut self, event: LedgerEvent) {
        self.events.push(EventRecord {
            at: Utc::now(),
            event,
        });
    }
}

/// Serialized-access facade over the three ledger state machines.
#[derive(Debug)]
pub struct SkysuretyNode {
    state: RwLock<NodeState>,
}

impl SkysuretyNode {
    /// Boot the ledger with the genesis airline directly admitted.
    pub fn genesis(
        params: ProtocolParams,
        genesis_airline: Address,
    ) -> Result<Self, NodeError> {
        params.validate()?;

        let registry = AirlineRegistry::genesis(params.clone(), genesis_airline)?;
        let oracle = OracleConsensus::genesis(params.clone());
        let ledger = EscrowLedger::genesis(params);

        let mut state = NodeState {
            registry,
            oracle,
            ledger,
            events: Vec::new(),
        };
        state.record(LedgerEvent::AirlineAdmitted {
            airline: genesis_airline,
            votes: 0,
            via_consensus: false,
        });

        Ok(SkysuretyNode {
            state: RwLock::new(state),
        })
    }

    /// Propose a candidate airline or vote for a pending one.
    pub fn register_or_vote(
        &self,
        caller: Address,
        candidate: Address,
    ) -> Result<AdmissionStatus, NodeError> {
        let mut state = self.state.write();
        let outcome = state.registry.propose_or_vote(candidate, caller)?;

        if outcome.vote_recorded {
            state.record(LedgerEvent::VoteRecorded {
                candidate,
                voter: caller,
                votes: outcome.status.votes,
            });
        }
        if outcome.admitted_now {
            state.record(LedgerEvent::AirlineAdmitted {
                airline: candidate,
                votes: outcome.status.votes,
                via_consensus: outcome.status.votes > 0,
            });
        }
        Ok(outcome.status)
    }

    /// Pay the verification fee for the calling airline. Returns the change
    /// due; exactly the fixed fee lands in the airline escrow.
    pub fn verify_airline(&self, caller: Address, fee_paid: u128) -> Result<u128, NodeError> {
        let mut state = self.state.write();
        let receipt = state.registry.verify(caller, fee_paid)?;
        state.ledger.credit_escrow(caller, receipt.fee_credited);
        state.record(LedgerEvent::AirlineVerified {
            airline: caller,
            fee: receipt.fee_credited,
        });
        Ok(receipt.change_due)
    }

    /// Buy insurance against `airline` for the calling passenger. Returns
    /// the change due above the premium cap.
    pub fn buy_insurance(
        &self,
        caller: Address,
        airline: Address,
        fee_paid: u128,
    ) -> Result<u128, NodeError> {
        let mut state = self.state.write();
        if !state.registry.is_verified(&airline) {
            return Err(NodeError::AirlineNotEligible);
        }

        let now = Utc::now().timestamp().max(0) as u64;
        let receipt = state.ledger.buy_insurance(airline, caller, fee_paid, now)?;
        state.record(LedgerEvent::PolicyPurchased {
            airline,
            passenger: caller,
            premium: receipt.charged,
        });
        Ok(receipt.change_due)
    }

    /// Open a flight-status request. The emitted `StatusRequested` event is
    /// the signal the oracle-operator population watches.
    pub fn request_flight_status(
        &self,
        caller: Address,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> Result<RequestKey, NodeError> {
        let mut state = self.state.write();
        let opened = state
            .oracle
            .request_status(caller, airline, flight, timestamp)?;
        state.record(LedgerEvent::StatusRequested {
            key: opened.key,
            index: opened.index,
            airline,
            flight: flight.to_string(),
            timestamp,
        });
        Ok(opened.key)
    }

    /// Register the caller as an oracle. The fee is absorbed into the
    /// operations pool; the assigned indexes are returned.
    pub fn register_oracle(
        &self,
        caller: Address,
        fee_paid: u128,
    ) -> Result<[u8; 3], NodeError> {
        let mut state = self.state.write();
        let indexes = state.oracle.register_oracle(caller, fee_paid)?;
        state.ledger.credit_operations_pool(fee_paid);
        state.record(LedgerEvent::OracleRegistered {
            oracle: caller,
            indexes,
        });
        Ok(indexes)
    }

    /// Submit an oracle response. When the response reaches majority on an
    /// airline-fault status, the payout sweep runs in the same critical
    /// section and its report is returned.
    pub fn submit_oracle_response(
        &self,
        caller: Address,
        index: u8,
        airline: Address,
        flight: &str,
        timestamp: u64,
        status: FlightStatus,
    ) -> Result<Option<SweepReport>, NodeError> {
        let mut state = self.state.write();
        let outcome = state
            .oracle
            .submit_response(caller, index, airline, flight, timestamp, status)?;
        state.record(LedgerEvent::ResponseRecorded {
            key: outcome.key,
            oracle: caller,
            status,
            tally: outcome.tally,
        });

        let resolution = match outcome.resolution {
            Some(resolution) => resolution,
            None => return Ok(None),
        };
        state.record(LedgerEvent::FlightStatusResolved {
            key: outcome.key,
            airline,
            flight: resolution.flight.clone(),
            timestamp,
            status: resolution.status,
        });

        if !resolution.status.is_airline_fault() {
            return Ok(None);
        }
        let report = state.ledger.settle_airline_fault(airline)?;
        for (passenger, amount) in &report.payouts {
            state.record(LedgerEvent::PayoutCredited {
                airline,
                passenger: *passenger,
                amount: *amount,
            });
        }
        Ok(Some(report))
    }

    /// Withdraw from the caller's balance. The ledger is debited before the
    /// amount is handed back to the payment rail.
    pub fn withdraw(&self, caller: Address, amount: u128) -> Result<u128, NodeError> {
        let mut state = self.state.write();
        let paid_out = state.ledger.withdraw(caller, amount)?;
        state.record(LedgerEvent::FundsWithdrawn {
            passenger: caller,
            amount: paid_out,
        });
        Ok(paid_out)
    }

    // --- Read-only queries ---

    pub fn airline_status(&self, airline: Address) -> Option<AdmissionStatus> {
        self.state.read().registry.status(&airline)
    }

    pub fn registered_airline_count(&self) -> usize {
        self.state.read().registry.registered_count()
    }

    pub fn escrow_balance(&self, airline: Address) -> u128 {
        self.state.read().ledger.escrow_balance(&airline)
    }

    pub fn passenger_balance(&self, passenger: Address) -> u128 {
        self.state.read().ledger.passenger_balance(&passenger)
    }

    pub fn has_active_policy(&self, airline: Address, passenger: Address) -> bool {
        self.state.read().ledger.has_active_policy(&airline, &passenger)
    }

    pub fn oracle_indexes(&self, oracle: Address) -> Option<[u8; 3]> {
        self.state.read().oracle.oracle_indexes(&oracle)
    }

    pub fn request(&self, key: RequestKey) -> Option<StatusRequest> {
        self.state.read().oracle.request(&key).cloned()
    }

    pub fn funds_flow(&self) -> FundsFlow {
        self.state.read().ledger.funds_flow()
    }

    pub fn verify_conservation(&self) -> Result<(), NodeError> {
        self.state.read().ledger.verify_conservation()?;
        Ok(())
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.state.read().events.clone()
    }

    pub fn summary(&self) -> NodeSummary {
        let state = self.state.read();
        NodeSummary {
            registered_airlines: state.registry.registered_count(),
            votes_required: state.registry.votes_required(),
            oracle_count: state.oracle.oracle_count(),
            open_requests: state.oracle.open_request_count(),
            funds: state.ledger.funds_flow(),
            events: state.events.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skysurety_core::UNIT;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn node() -> SkysuretyNode {
        SkysuretyNode::genesis(ProtocolParams::default(), addr(1)).unwrap()
    }

    #[test]
    fn test_genesis_validates_params() {
        let mut params = ProtocolParams::default();
        params.oracle_majority = 0;
        assert!(matches!(
            SkysuretyNode::genesis(params, addr(1)).unwrap_err(),
            NodeError::Params(_)
        ));
    }

    #[test]
    fn test_insurance_requires_verified_airline() {
        let node = node();
        node.register_or_vote(addr(1), addr(2)).unwrap();
        assert_eq!(
            node.buy_insurance(addr(10), addr(2), UNIT).unwrap_err(),
            NodeError::AirlineNotEligible
        );

        node.verify_airline(addr(2), 10 * UNIT).unwrap();
        assert!(node.buy_insurance(addr(10), addr(2), UNIT).is_ok());
    }

    #[test]
    fn test_verification_credits_escrow_atomically() {
        let node = node();
        let change = node.verify_airline(addr(1), 10 * UNIT + 7).unwrap();
        assert_eq!(change, 7);
        assert_eq!(node.escrow_balance(addr(1)), 10 * UNIT);
        assert!(node.airline_status(addr(1)).unwrap().verified);
    }

    #[test]
    fn test_oracle_fee_lands_in_operations_pool() {
        let node = node();
        node.register_oracle(addr(50), UNIT + 3).unwrap();
        assert_eq!(node.funds_flow().operations_pool, UNIT + 3);
        node.verify_conservation().unwrap();
    }

    #[test]
    fn test_admission_event_emitted_once() {
        let node = node();
        node.register_or_vote(addr(1), addr(2)).unwrap();
        let admissions = node
            .events()
            .iter()
            .filter(|r| {
                matches!(
                    r.event,
                    LedgerEvent::AirlineAdmitted { airline, .. } if airline == addr(2)
                )
            })
            .count();
        assert_eq!(admissions, 1);
    }
}
