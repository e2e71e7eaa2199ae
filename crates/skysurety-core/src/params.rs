/// PROTOCOL PARAMETERS
///
/// Fixed economic and consensus parameters shared by every component. The
/// values are tunable at construction but validated against hard bounds;
/// the defaults reproduce the canonical deployment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base currency unit (8 decimals).
pub const UNIT: u128 = 100_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamsError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Protocol-wide parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Registered-airline count below which candidates are admitted without
    /// a vote.
    pub airline_fast_path_limit: usize,
    /// One-time fee an airline pays to become verified; credited to its
    /// escrow in full.
    pub verification_fee: u128,
    /// Cap on the chargeable insurance premium; excess is refunded.
    pub max_insurance_premium: u128,
    /// Fee an oracle pays to register; absorbed into the operations pool.
    pub oracle_registration_fee: u128,
    /// Size of the oracle index space; assigned indexes lie in [0, space).
    pub oracle_index_space: u8,
    /// Matching responses required to resolve a status code.
    pub oracle_majority: usize,
    /// Payout ratio applied to the premium (numerator / denominator).
    pub payout_numerator: u128,
    pub payout_denominator: u128,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        ProtocolParams {
            airline_fast_path_limit: 4,
            verification_fee: 10 * UNIT,
            max_insurance_premium: UNIT,
            oracle_registration_fee: UNIT,
            oracle_index_space: 10,
            oracle_majority: 3,
            payout_numerator: 3,
            payout_denominator: 2,
        }
    }
}

impl ProtocolParams {
    /// Validate parameters against hard bounds.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.airline_fast_path_limit == 0 {
            return Err(ParamsError::InvalidParameter(
                "airline_fast_path_limit must be at least 1".to_string(),
            ));
        }
        if self.verification_fee == 0 {
            return Err(ParamsError::InvalidParameter(
                "verification_fee must be non-zero".to_string(),
            ));
        }
        if self.max_insurance_premium == 0 {
            return Err(ParamsError::InvalidParameter(
                "max_insurance_premium must be non-zero".to_string(),
            ));
        }
        if self.oracle_registration_fee == 0 {
            return Err(ParamsError::InvalidParameter(
                "oracle_registration_fee must be non-zero".to_string(),
            ));
        }
        // Each oracle holds 3 distinct indexes; the space must fit them.
        if self.oracle_index_space < 3 {
            return Err(ParamsError::InvalidParameter(format!(
                "oracle_index_space {} cannot hold 3 distinct indexes",
                self.oracle_index_space
            )));
        }
        if self.oracle_majority == 0 {
            return Err(ParamsError::InvalidParameter(
                "oracle_majority must be at least 1".to_string(),
            ));
        }
        if self.payout_denominator == 0 {
            return Err(ParamsError::InvalidParameter(
                "payout_denominator must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Payout owed for a policy premium (integer arithmetic, truncating).
    pub fn payout_for(&self, premium: u128) -> u128 {
        premium.saturating_mul(self.payout_numerator) / self.payout_denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_validate() {
        assert!(ProtocolParams::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = ProtocolParams::default();
        params.oracle_index_space = 2;
        assert!(params.validate().is_err());

        let mut params = ProtocolParams::default();
        params.payout_denominator = 0;
        assert!(params.validate().is_err());

        let mut params = ProtocolParams::default();
        params.verification_fee = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_payout_truncates() {
        let params = ProtocolParams::default();
        // 3/2 of an odd premium truncates.
        assert_eq!(params.payout_for(3), 4);
        assert_eq!(params.payout_for(UNIT), UNIT + UNIT / 2);
        assert_eq!(params.payout_for(0), 0);
    }
}
