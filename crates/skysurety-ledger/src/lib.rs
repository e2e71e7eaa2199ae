// === Escrow & Insurance Ledger ===
pub mod escrow;

pub use escrow::{
    EscrowLedger, FundsFlow, InsurancePolicy, LedgerError, PurchaseReceipt, SweepReport,
};
