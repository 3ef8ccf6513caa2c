//! Fee handling for host-originated transactions.
//!
//! The submission manager prices, signs, and submits transactions on behalf
//! of the node's own identity. Price discovery is static: validators
//! advertise a floor gas price out of band and the host is configured with
//! it.

use ed25519_dalek::Keypair;
use tracing::debug;

use crate::errors::{HostError, HostResult};
use crate::transaction::{Fee, SignedTransaction, Transaction};

pub trait PriceDiscovery: Send + Sync {
    fn gas_price(&self) -> HostResult<u64>;
}

/// Price discovery pinned to a configured value.
pub struct StaticPriceDiscovery {
    price: u64,
}

impl StaticPriceDiscovery {
    pub fn new(price: u64) -> Self {
        Self { price }
    }
}

impl PriceDiscovery for StaticPriceDiscovery {
    fn gas_price(&self) -> HostResult<u64> {
        Ok(self.price)
    }
}

pub struct SubmissionManager {
    price_discovery: Box<dyn PriceDiscovery>,
    max_fee: u64,
}

impl SubmissionManager {
    pub fn new(price_discovery: Box<dyn PriceDiscovery>, max_fee: u64) -> Self {
        Self {
            price_discovery,
            max_fee,
        }
    }

    /// Attach a fee to `transaction` using discovered pricing and the
    /// supplied gas estimate. Transactions that already carry a fee are left
    /// untouched.
    pub fn price_transaction(
        &self,
        transaction: &mut Transaction,
        estimated_gas: u64,
    ) -> HostResult<()> {
        if transaction.fee.is_some() {
            return Ok(());
        }
        let gas_price = self.price_discovery.gas_price()?;
        let amount = gas_price.checked_mul(estimated_gas).ok_or_else(|| {
            HostError::Config("transaction fee overflows the fee balance".into())
        })?;
        if self.max_fee > 0 && amount > self.max_fee {
            return Err(HostError::Config(format!(
                "computed fee {amount} exceeds configured maximum {}",
                self.max_fee
            )));
        }
        debug!(gas = estimated_gas, amount, "priced transaction");
        transaction.fee = Some(Fee {
            amount,
            gas: estimated_gas,
        });
        Ok(())
    }

    /// Price and sign `transaction` with the node identity.
    pub fn sign_transaction(
        &self,
        signer: &Keypair,
        mut transaction: Transaction,
        estimated_gas: u64,
    ) -> HostResult<SignedTransaction> {
        self.price_transaction(&mut transaction, estimated_gas)?;
        transaction.sign(signer)
    }
}

/// Reconstruct the caller-visible error for a non-OK check/deliver result.
/// Falls back to a plain error bearing the log line when the `(module,
/// code)` pair maps to no registered domain error.
pub fn result_error(module: &str, code: u32, log: &str) -> HostError {
    match crate::errors::from_code(module, code) {
        Some(err) => err,
        None => HostError::Internal(log.to_string()),
    }
}
