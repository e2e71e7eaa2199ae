/// AIRLINE ADMISSION CONSENSUS
///
/// State machine per airline address:
/// Unregistered -> PendingConsensus -> Registered -> (optional) Verified.
///
/// Admission is direct while the registered population is below the fast-path
/// limit; beyond it, a candidate needs votes from half of the registered
/// airlines (integer division). Verification is a one-time fee gate that
/// unlocks insurance sales.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use skysurety_core::{Address, ProtocolParams};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("Candidate is the zero address")]
    InvalidCandidate,
    #[error("Caller is not a registered airline")]
    NotRegistered,
    #[error("Airline is already registered")]
    AlreadyRegistered,
    #[error("Airline is already verified")]
    AlreadyVerified,
    #[error("Verification fee {paid} below required {required}")]
    InsufficientFee { paid: u128, required: u128 },
}

/// Per-airline admission record. Append-only; never destroyed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirlineAccount {
    pub registered: bool,
    pub verified: bool,
    /// Registered airlines that voted for this candidate, at most once each.
    pub voters: BTreeSet<Address>,
}

/// Snapshot of a candidate's admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub registered: bool,
    pub verified: bool,
    pub votes: usize,
}

/// Result of a propose-or-vote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub status: AdmissionStatus,
    /// The candidate crossed into the registered set during this call.
    pub admitted_now: bool,
    /// A new vote was recorded (false for fast-path, self- and repeat votes).
    pub vote_recorded: bool,
}

/// Result of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationReceipt {
    /// Exactly the fixed fee, to be credited to the airline escrow.
    pub fee_credited: u128,
    /// Excess over the fee, returned to the caller.
    pub change_due: u128,
}

/// Admission state machine and vote tally for all airlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirlineRegistry {
    params: ProtocolParams,
    airlines: BTreeMap<Address, AirlineAccount>,
    registered_count: usize,
}

impl AirlineRegistry {
    /// Initialize the registry with the genesis airline directly admitted.
    /// This is the only implicit admission.
    pub fn genesis(
        params: ProtocolParams,
        genesis_airline: Address,
    ) -> Result<Self, AdmissionError> {
        if genesis_airline.is_zero() {
            return Err(AdmissionError::InvalidCandidate);
        }

        let mut airlines = BTreeMap::new();
        airlines.insert(
            genesis_airline,
            AirlineAccount {
                registered: true,
                verified: false,
                voters: BTreeSet::new(),
            },
        );

        info!("Genesis airline admitted: {genesis_airline}");
        Ok(AirlineRegistry {
            params,
            airlines,
            registered_count: 1,
        })
    }

    /// Propose a candidate airline, or vote for one already pending.
    ///
    /// Below the fast-path limit the candidate is admitted immediately with
    /// no vote. Otherwise the proposer's vote is recorded at most once per
    /// (candidate, proposer) pair; self-votes are skipped without error.
    pub fn propose_or_vote(
        &mut self,
        candidate: Address,
        proposer: Address,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        if candidate.is_zero() {
            return Err(AdmissionError::InvalidCandidate);
        }
        if !self.is_registered(&proposer) {
            return Err(AdmissionError::NotRegistered);
        }
        if self.is_registered(&candidate) {
            return Err(AdmissionError::AlreadyRegistered);
        }

        let registered_count = self.registered_count;
        let threshold = registered_count / 2;
        let account = self.airlines.entry(candidate).or_default();

        let mut admitted_now = false;
        let mut vote_recorded = false;

        if registered_count < self.params.airline_fast_path_limit {
            account.registered = true;
            admitted_now = true;
            info!(
                "Airline {candidate} admitted via fast path ({} registered)",
                registered_count + 1
            );
        } else if proposer == candidate {
            // Self-votes are skipped, not rejected.
            debug!("Self-vote by {candidate} skipped");
        } else if account.voters.insert(proposer) {
            vote_recorded = true;
            debug!(
                "Vote for {candidate} by {proposer} ({} of {threshold})",
                account.voters.len()
            );
            if account.voters.len() >= threshold {
                account.registered = true;
                admitted_now = true;
                info!(
                    "Airline {candidate} admitted by consensus with {} votes",
                    account.voters.len()
                );
            }
        } else {
            // Repeat vote from the same proposer; never double-counted.
            debug!("Repeat vote for {candidate} by {proposer} ignored");
        }

        let status = AdmissionStatus {
            registered: account.registered,
            verified: account.verified,
            votes: account.voters.len(),
        };
        if admitted_now {
            self.registered_count += 1;
        }

        Ok(AdmissionOutcome {
            status,
            admitted_now,
            vote_recorded,
        })
    }

    /// Mark a registered airline as verified against the one-time fee.
    ///
    /// Exactly the fixed fee is creditable to escrow; any excess is returned
    /// as change. The caller is responsible for the escrow credit so that it
    /// happens under the same serialization point.
    pub fn verify(
        &mut self,
        airline: Address,
        fee_paid: u128,
    ) -> Result<VerificationReceipt, AdmissionError> {
        let required = self.params.verification_fee;
        let account = self
            .airlines
            .get_mut(&airline)
            .filter(|a| a.registered)
            .ok_or(AdmissionError::NotRegistered)?;
        if account.verified {
            return Err(AdmissionError::AlreadyVerified);
        }
        if fee_paid < required {
            return Err(AdmissionError::InsufficientFee {
                paid: fee_paid,
                required,
            });
        }

        account.verified = true;
        info!("Airline {airline} verified");
        Ok(VerificationReceipt {
            fee_credited: required,
            change_due: fee_paid - required,
        })
    }

    pub fn is_registered(&self, airline: &Address) -> bool {
        self.airlines.get(airline).is_some_and(|a| a.registered)
    }

    pub fn is_verified(&self, airline: &Address) -> bool {
        self.airlines.get(airline).is_some_and(|a| a.verified)
    }

    pub fn registered_count(&self) -> usize {
        self.registered_count
    }

    /// Votes currently required to admit a candidate by consensus.
    pub fn votes_required(&self) -> usize {
        self.registered_count / 2
    }

    pub fn status(&self, airline: &Address) -> Option<AdmissionStatus> {
        self.airlines.get(airline).map(|a| AdmissionStatus {
            registered: a.registered,
            verified: a.verified,
            votes: a.voters.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn registry() -> AirlineRegistry {
        AirlineRegistry::genesis(ProtocolParams::default(), addr(1)).unwrap()
    }

    #[test]
    fn test_genesis_rejects_zero_address() {
        assert_eq!(
            AirlineRegistry::genesis(ProtocolParams::default(), Address::ZERO).unwrap_err(),
            AdmissionError::InvalidCandidate
        );
    }

    #[test]
    fn test_fast_path_admissions() {
        let mut reg = registry();
        for n in 2..=4 {
            let outcome = reg.propose_or_vote(addr(n), addr(1)).unwrap();
            assert!(outcome.admitted_now);
            assert!(outcome.status.registered);
            assert_eq!(outcome.status.votes, 0);
        }
        assert_eq!(reg.registered_count(), 4);
    }

    #[test]
    fn test_fifth_airline_needs_consensus() {
        let mut reg = registry();
        for n in 2..=4 {
            reg.propose_or_vote(addr(n), addr(1)).unwrap();
        }

        // Four registered: threshold is 4 / 2 = 2 votes.
        let outcome = reg.propose_or_vote(addr(5), addr(1)).unwrap();
        assert!(!outcome.status.registered);
        assert_eq!(outcome.status.votes, 1);

        let outcome = reg.propose_or_vote(addr(5), addr(2)).unwrap();
        assert!(outcome.admitted_now);
        assert!(outcome.status.registered);
        assert_eq!(outcome.status.votes, 2);
        assert_eq!(reg.registered_count(), 5);
    }

    #[test]
    fn test_duplicate_votes_not_double_counted() {
        let mut reg = registry();
        for n in 2..=4 {
            reg.propose_or_vote(addr(n), addr(1)).unwrap();
        }

        let first = reg.propose_or_vote(addr(5), addr(1)).unwrap();
        assert!(first.vote_recorded);
        let repeat = reg.propose_or_vote(addr(5), addr(1)).unwrap();
        assert!(!repeat.vote_recorded);
        assert_eq!(repeat.status.votes, 1);
        assert!(!repeat.status.registered);
    }

    #[test]
    fn test_self_proposal_never_admits() {
        let mut reg = registry();
        for n in 2..=5 {
            reg.propose_or_vote(addr(n), addr(1)).unwrap();
        }
        reg.propose_or_vote(addr(5), addr(2)).unwrap();
        assert_eq!(reg.registered_count(), 5);

        // A registered airline proposing itself is already registered.
        assert_eq!(
            reg.propose_or_vote(addr(5), addr(5)).unwrap_err(),
            AdmissionError::AlreadyRegistered
        );
        // A pending candidate cannot vote for itself: it is not registered.
        let outcome = reg.propose_or_vote(addr(6), addr(1)).unwrap();
        assert!(!outcome.status.registered);
        assert_eq!(
            reg.propose_or_vote(addr(6), addr(6)).unwrap_err(),
            AdmissionError::NotRegistered
        );
    }

    #[test]
    fn test_unregistered_proposer_rejected() {
        let mut reg = registry();
        assert_eq!(
            reg.propose_or_vote(addr(3), addr(2)).unwrap_err(),
            AdmissionError::NotRegistered
        );
    }

    #[test]
    fn test_zero_candidate_rejected() {
        let mut reg = registry();
        assert_eq!(
            reg.propose_or_vote(Address::ZERO, addr(1)).unwrap_err(),
            AdmissionError::InvalidCandidate
        );
    }

    #[test]
    fn test_registered_count_only_increases() {
        let mut reg = registry();
        let mut last = reg.registered_count();
        for n in 2..=8 {
            let _ = reg.propose_or_vote(addr(n), addr(1));
            assert!(reg.registered_count() >= last);
            last = reg.registered_count();
        }
    }

    #[test]
    fn test_verify_fee_gate() {
        let params = ProtocolParams::default();
        let fee = params.verification_fee;
        let mut reg = registry();

        // Below the fee.
        assert_eq!(
            reg.verify(addr(1), fee - 1).unwrap_err(),
            AdmissionError::InsufficientFee {
                paid: fee - 1,
                required: fee
            }
        );

        // Overpayment returns change; exactly the fee is credited.
        let receipt = reg.verify(addr(1), fee + 250).unwrap();
        assert_eq!(receipt.fee_credited, fee);
        assert_eq!(receipt.change_due, 250);
        assert!(reg.is_verified(&addr(1)));

        // Idempotence: a second verification fails.
        assert_eq!(
            reg.verify(addr(1), fee).unwrap_err(),
            AdmissionError::AlreadyVerified
        );
    }

    #[test]
    fn test_verify_requires_registration() {
        let mut reg = registry();
        assert_eq!(
            reg.verify(addr(9), ProtocolParams::default().verification_fee)
                .unwrap_err(),
            AdmissionError::NotRegistered
        );
    }
}
