/// ESCROW & INSURANCE LEDGER
///
/// Holds per-airline escrow balances, per-passenger withdrawable balances
/// and the insurance policies connecting them. All value movement is
/// ledger-internal: payments in arrive as amounts attached to operations,
/// payments out are amounts handed back to the payment rail after the
/// ledger has already been debited.
///
/// Running totals are kept in `FundsFlow` and checked by
/// `verify_conservation`: no operation may create or destroy value.

use log::info;
use serde::{Deserialize, Serialize};
use skysurety_core::{Address, ProtocolParams};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Premium must be non-zero")]
    ZeroPremium,
    #[error("An active policy already exists for this airline and passenger")]
    DuplicatePolicy,
    #[error("Withdrawal amount must be non-zero")]
    ZeroAmount,
    #[error("Balance {available} insufficient for withdrawal of {requested}")]
    InsufficientBalance { available: u128, requested: u128 },
    #[error("Escrow {available} insufficient for payout of {required}")]
    InsufficientEscrow { available: u128, required: u128 },
    #[error("Funds conservation violated: {0}")]
    ConservationViolated(String),
}

/// One insurance policy, keyed by (airline, passenger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    /// Charged premium, already capped.
    pub premium_paid: u128,
    pub purchased_at: u64,
    /// Set by the payout sweep; a settled policy is paid at most once.
    pub settled: bool,
}

impl InsurancePolicy {
    pub fn is_active(&self) -> bool {
        self.premium_paid > 0 && !self.settled
    }
}

/// Result of an insurance purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseReceipt {
    /// Amount actually charged and credited to the airline escrow.
    pub charged: u128,
    /// Excess over the premium cap, returned to the caller.
    pub change_due: u128,
}

/// Result of an airline-fault payout sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub airline: Address,
    /// Credited passengers with their payout amounts, in policy purchase
    /// order.
    pub payouts: Vec<(Address, u128)>,
    pub total: u128,
}

/// Running totals over all value that entered or left the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsFlow {
    /// Everything credited to airline escrows (verification fees plus
    /// charged premiums).
    pub total_escrowed: u128,
    /// Charged premiums only.
    pub total_premiums: u128,
    /// Everything swept from escrows into passenger balances.
    pub total_payouts: u128,
    /// Everything withdrawn by passengers.
    pub total_withdrawn: u128,
    /// Oracle registration fees; held outside the escrow system.
    pub operations_pool: u128,
}

/// Balance-consistent escrow and insurance ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowLedger {
    params: ProtocolParams,
    escrows: BTreeMap<Address, u128>,
    policies: BTreeMap<(Address, Address), InsurancePolicy>,
    /// Insurance purchasers per airline, in insertion order.
    passengers: BTreeMap<Address, Vec<Address>>,
    balances: BTreeMap<Address, u128>,
    flow: FundsFlow,
}

impl EscrowLedger {
    pub fn genesis(params: ProtocolParams) -> Self {
        EscrowLedger {
            params,
            escrows: BTreeMap::new(),
            policies: BTreeMap::new(),
            passengers: BTreeMap::new(),
            balances: BTreeMap::new(),
            flow: FundsFlow::default(),
        }
    }

    /// Credit an airline escrow (verification fee flow).
    pub fn credit_escrow(&mut self, airline: Address, amount: u128) {
        *self.escrows.entry(airline).or_insert(0) += amount;
        self.flow.total_escrowed += amount;
    }

    /// Absorb an oracle registration fee into the operations pool.
    pub fn credit_operations_pool(&mut self, amount: u128) {
        self.flow.operations_pool += amount;
    }

    /// Create a policy for (airline, passenger), charging at most the
    /// premium cap and crediting the airline escrow with the charge.
    ///
    /// Airline eligibility (verification) is enforced by the caller before
    /// this is invoked.
    pub fn buy_insurance(
        &mut self,
        airline: Address,
        passenger: Address,
        premium: u128,
        now: u64,
    ) -> Result<PurchaseReceipt, LedgerError> {
        if premium == 0 {
            return Err(LedgerError::ZeroPremium);
        }
        if self
            .policies
            .get(&(airline, passenger))
            .is_some_and(|p| p.is_active())
        {
            return Err(LedgerError::DuplicatePolicy);
        }

        let charged = premium.min(self.params.max_insurance_premium);
        let change_due = premium - charged;

        self.policies.insert(
            (airline, passenger),
            InsurancePolicy {
                premium_paid: charged,
                purchased_at: now,
                settled: false,
            },
        );
        let list = self.passengers.entry(airline).or_default();
        if !list.contains(&passenger) {
            list.push(passenger);
        }
        *self.escrows.entry(airline).or_insert(0) += charged;
        self.flow.total_escrowed += charged;
        self.flow.total_premiums += charged;

        info!("Policy purchased: airline {airline}, passenger {passenger}, premium {charged}");
        Ok(PurchaseReceipt { charged, change_due })
    }

    /// Pay out every active policy under `airline` at the configured ratio.
    ///
    /// All-or-nothing: the total payout is computed first and the sweep
    /// fails without any state change if the escrow cannot cover it.
    /// Passenger balances are credited and policies settled atomically
    /// under the ledger's serialization point.
    pub fn settle_airline_fault(&mut self, airline: Address) -> Result<SweepReport, LedgerError> {
        let insured = self.passengers.get(&airline).cloned().unwrap_or_default();

        let mut payouts = Vec::new();
        let mut total: u128 = 0;
        for passenger in insured {
            let policy = match self.policies.get(&(airline, passenger)) {
                Some(p) if p.is_active() => p,
                _ => continue,
            };
            let payout = self.params.payout_for(policy.premium_paid);
            payouts.push((passenger, payout));
            total += payout;
        }

        if total == 0 {
            return Ok(SweepReport {
                airline,
                payouts,
                total,
            });
        }

        let escrow = self.escrows.get(&airline).copied().unwrap_or(0);
        if escrow < total {
            return Err(LedgerError::InsufficientEscrow {
                available: escrow,
                required: total,
            });
        }

        self.escrows.insert(airline, escrow - total);
        for (passenger, payout) in &payouts {
            *self.balances.entry(*passenger).or_insert(0) += payout;
            if let Some(policy) = self.policies.get_mut(&(airline, *passenger)) {
                policy.settled = true;
            }
        }
        self.flow.total_payouts += total;

        info!(
            "Airline {airline} fault settled: {} passengers credited, {total} total",
            payouts.len()
        );
        Ok(SweepReport {
            airline,
            payouts,
            total,
        })
    }

    /// Debit a passenger balance and hand the amount back for external
    /// payment. The debit always precedes the payment side effect.
    pub fn withdraw(&mut self, passenger: Address, amount: u128) -> Result<u128, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let balance = self.balances.get(&passenger).copied().unwrap_or(0);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }

        self.balances.insert(passenger, balance - amount);
        self.flow.total_withdrawn += amount;

        info!("Passenger {passenger} withdrew {amount}");
        Ok(amount)
    }

    pub fn escrow_balance(&self, airline: &Address) -> u128 {
        self.escrows.get(airline).copied().unwrap_or(0)
    }

    pub fn passenger_balance(&self, passenger: &Address) -> u128 {
        self.balances.get(passenger).copied().unwrap_or(0)
    }

    pub fn policy(&self, airline: &Address, passenger: &Address) -> Option<&InsurancePolicy> {
        self.policies.get(&(*airline, *passenger))
    }

    pub fn has_active_policy(&self, airline: &Address, passenger: &Address) -> bool {
        self.policy(airline, passenger).is_some_and(|p| p.is_active())
    }

    pub fn passengers_of(&self, airline: &Address) -> &[Address] {
        self.passengers
            .get(airline)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn funds_flow(&self) -> FundsFlow {
        self.flow
    }

    /// Check that no value was created or destroyed.
    pub fn verify_conservation(&self) -> Result<(), LedgerError> {
        let escrow_sum: u128 = self.escrows.values().sum();
        let balance_sum: u128 = self.balances.values().sum();

        // Escrow outflow happens only through payouts.
        if escrow_sum + self.flow.total_payouts != self.flow.total_escrowed {
            return Err(LedgerError::ConservationViolated(format!(
                "escrows {escrow_sum} + payouts {} != escrowed {}",
                self.flow.total_payouts, self.flow.total_escrowed
            )));
        }
        // Passenger balances are fed only by payouts and drained only by
        // withdrawals.
        if balance_sum + self.flow.total_withdrawn != self.flow.total_payouts {
            return Err(LedgerError::ConservationViolated(format!(
                "balances {balance_sum} + withdrawn {} != payouts {}",
                self.flow.total_withdrawn, self.flow.total_payouts
            )));
        }
        if self.flow.total_premiums > self.flow.total_escrowed {
            return Err(LedgerError::ConservationViolated(format!(
                "premiums {} exceed escrow inflow {}",
                self.flow.total_premiums, self.flow.total_escrowed
            )));
        }
        Ok(())
    }
}
