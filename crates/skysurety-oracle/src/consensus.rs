/// ORACLE REQUEST / RESPONSE CONSENSUS
///
/// Any caller may open a flight-status request; registered oracles holding
/// the request's index submit status responses. The first status code to
/// collect a majority of matching responses resolves the request, exactly
/// once. Responses arriving after resolution are recorded for the audit
/// trail but can never resolve the request again.

use crate::indexes::{IndexGenerator, INDEXES_PER_ORACLE};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skysurety_core::{Address, FlightStatus, ProtocolParams, RequestKey};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle is already registered")]
    AlreadyRegistered,
    #[error("Registration fee {paid} below required {required}")]
    InsufficientFee { paid: u128, required: u128 },
    #[error("Caller is not a registered oracle")]
    UnknownOracle,
    #[error("Index {index} is not assigned to this oracle")]
    IndexMismatch { index: u8 },
    #[error("No request exists for the derived key")]
    UnknownRequest,
    #[error("Oracle already responded to this request")]
    DuplicateResponse,
    #[error("Flight identifier is empty")]
    EmptyFlight,
}

/// Derive the opaque request key.
///
/// The key covers the index, airline, flight and timestamp but NOT the
/// requester identity: two requesters assigned the same index for the same
/// flight collide on one record. Documented quirk, preserved.
pub fn derive_request_key(
    index: u8,
    airline: &Address,
    flight: &str,
    timestamp: u64,
) -> RequestKey {
    let mut hasher = Sha256::new();
    hasher.update([index]);
    hasher.update(airline.as_bytes());
    hasher.update(flight.as_bytes());
    hasher.update(timestamp.to_le_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    RequestKey(key)
}

/// A registered oracle reporter. Indexes are immutable after assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAccount {
    pub indexes: [u8; INDEXES_PER_ORACLE],
}

/// One flight-status request and its response tallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub requester: Address,
    /// Oracle index this request was opened under.
    pub index: u8,
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    /// Cleared exactly once, when a status code reaches majority.
    pub open: bool,
    /// Responding oracles per status code, in arrival order.
    pub responses: BTreeMap<FlightStatus, Vec<Address>>,
    /// Every oracle that has responded, for per-request de-duplication.
    pub responders: BTreeSet<Address>,
    pub resolved_status: Option<FlightStatus>,
}

/// A newly opened request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedRequest {
    pub key: RequestKey,
    pub index: u8,
}

/// Majority outcome of a request: the resolved real-world flight status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
    pub status: FlightStatus,
}

/// Result of one accepted oracle response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub key: RequestKey,
    /// Matching responses for this status code after the submission.
    pub tally: usize,
    /// Present exactly once per request, on the response that reached
    /// majority while the request was still open.
    pub resolution: Option<Resolution>,
}

/// Oracle registration, request tracking and response aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConsensus {
    params: ProtocolParams,
    oracles: BTreeMap<Address, OracleAccount>,
    requests: BTreeMap<RequestKey, StatusRequest>,
    index_gen: IndexGenerator,
}

impl OracleConsensus {
    pub fn genesis(params: ProtocolParams) -> Self {
        OracleConsensus {
            params,
            oracles: BTreeMap::new(),
            requests: BTreeMap::new(),
            index_gen: IndexGenerator::new(0),
        }
    }

    /// Register the caller as an oracle and assign its three indexes.
    pub fn register_oracle(
        &mut self,
        caller: Address,
        fee_paid: u128,
    ) -> Result<[u8; INDEXES_PER_ORACLE], OracleError> {
        if self.oracles.contains_key(&caller) {
            return Err(OracleError::AlreadyRegistered);
        }
        let required = self.params.oracle_registration_fee;
        if fee_paid < required {
            return Err(OracleError::InsufficientFee {
                paid: fee_paid,
                required,
            });
        }

        let indexes = self
            .index_gen
            .assign_indexes(&caller, self.params.oracle_index_space);
        self.oracles.insert(caller, OracleAccount { indexes });

        info!("Oracle {caller} registered with indexes {indexes:?}");
        Ok(indexes)
    }

    /// Open a flight-status request on behalf of `requester`.
    ///
    /// A repeat request hashing to the same key overwrites the prior record.
    pub fn request_status(
        &mut self,
        requester: Address,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> Result<OpenedRequest, OracleError> {
        if flight.is_empty() {
            return Err(OracleError::EmptyFlight);
        }

        let index = self
            .index_gen
            .next_index(&requester, self.params.oracle_index_space);
        let key = derive_request_key(index, &airline, flight, timestamp);

        self.requests.insert(
            key,
            StatusRequest {
                requester,
                index,
                airline,
                flight: flight.to_string(),
                timestamp,
                open: true,
                responses: BTreeMap::new(),
                responders: BTreeSet::new(),
                resolved_status: None,
            },
        );

        info!("Status request {key} opened for flight {flight} (index {index})");
        Ok(OpenedRequest { key, index })
    }

    /// Record one oracle response; resolve the request when a status code
    /// reaches majority while the request is open.
    pub fn submit_response(
        &mut self,
        oracle: Address,
        index: u8,
        airline: Address,
        flight: &str,
        timestamp: u64,
        status: FlightStatus,
    ) -> Result<ResponseOutcome, OracleError> {
        let account = self.oracles.get(&oracle).ok_or(OracleError::UnknownOracle)?;
        if !account.indexes.contains(&index) {
            return Err(OracleError::IndexMismatch { index });
        }

        let key = derive_request_key(index, &airline, flight, timestamp);
        let request = self
            .requests
            .get_mut(&key)
            .ok_or(OracleError::UnknownRequest)?;

        if !request.responders.insert(oracle) {
            return Err(OracleError::DuplicateResponse);
        }
        let responders = request.responses.entry(status).or_default();
        responders.push(oracle);
        let tally = responders.len();

        let mut resolution = None;
        if request.open && tally >= self.params.oracle_majority {
            request.open = false;
            request.resolved_status = Some(status);
            resolution = Some(Resolution {
                airline,
                flight: request.flight.clone(),
                timestamp,
                status,
            });
            info!("Request {key} resolved: flight {flight} is {status} ({tally} matching)");
        } else if !request.open {
            debug!("Late response to resolved request {key} recorded");
        }

        Ok(ResponseOutcome {
            key,
            tally,
            resolution,
        })
    }

    pub fn oracle_indexes(&self, oracle: &Address) -> Option<[u8; INDEXES_PER_ORACLE]> {
        self.oracles.get(oracle).map(|o| o.indexes)
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    pub fn request(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.requests.get(key)
    }

    pub fn open_request_count(&self) -> usize {
        self.requests.values().filter(|r| r.open).count()
    }
}
