//! Gas limit and fee parameter planning.

use std::sync::Arc;

use taskledger_config::SubmitterConfig;
use taskledger_ledger::{CallRequest, ContractCall, LedgerClient, LedgerError};
use taskledger_primitives::FeeParams;
use tracing::*;

use crate::PermanentFailure;

/// Revert reasons meaning the signer lacks permission.
const OWNER_MARKERS: &[&str] = &["caller is not the owner"];

/// Revert reasons meaning the payload is over the contract limit.
const SIZE_MARKERS: &[&str] = &["result too long", "topic too long", "payload too large"];

/// Maps an estimation error to a permanent failure, if it is one.
pub fn classify_estimation_error(err: &LedgerError) -> Option<PermanentFailure> {
    let msg = err.message();
    if OWNER_MARKERS.iter().any(|m| msg.contains(m)) {
        Some(PermanentFailure::NotOwner)
    } else if SIZE_MARKERS.iter().any(|m| msg.contains(m)) {
        Some(PermanentFailure::PayloadTooLarge)
    } else {
        None
    }
}

/// Applies both gas multipliers to a raw estimate, rounding up.
pub fn apply_gas_factors(raw: u64, safety_factor: f64, buffer_factor: f64) -> u64 {
    (raw as f64 * safety_factor * buffer_factor).ceil() as u64
}

#[derive(Debug)]
pub struct FeeEstimator<C> {
    client: Arc<C>,
    safety_factor: f64,
    buffer_factor: f64,
    default_gas_limit: u64,
}

impl<C: LedgerClient> FeeEstimator<C> {
    pub fn new(client: Arc<C>, config: &SubmitterConfig) -> Self {
        Self {
            client,
            safety_factor: config.gas_safety_factor,
            buffer_factor: config.gas_buffer_factor,
            default_gas_limit: config.default_gas_limit,
        }
    }

    /// Picks the gas limit for `call`.
    ///
    /// Estimation errors that carry a known revert reason abort the
    /// submission. Any other error falls back to the default limit, since a
    /// failed estimate does not mean the real call fails.
    pub async fn plan_gas(&self, call: &ContractCall) -> Result<u64, PermanentFailure> {
        let request =
            CallRequest::new(call.to, call.input.clone()).with_from(self.client.signer_address());

        match self.client.estimate_gas(request).await {
            Ok(raw) => {
                let limit = apply_gas_factors(raw, self.safety_factor, self.buffer_factor);
                debug!(call = call.label, %raw, %limit, "estimated gas");
                Ok(limit)
            }
            Err(e) => {
                if let Some(failure) = classify_estimation_error(&e) {
                    error!(call = call.label, err = %e, %failure, "call would always revert");
                    return Err(failure);
                }
                warn!(
                    call = call.label,
                    err = %e,
                    limit = self.default_gas_limit,
                    "gas estimation failed, using default limit"
                );
                Ok(self.default_gas_limit)
            }
        }
    }

    /// Current fee parameters: dynamic when the chain reports a base fee,
    /// legacy otherwise.
    pub async fn fee_params(&self) -> Result<FeeParams, LedgerError> {
        let gas_price = self.client.gas_price().await?;
        let base_fee = self.client.latest_base_fee().await.unwrap_or_else(|e| {
            debug!(err = %e, "base fee probe failed, assuming legacy fees");
            None
        });

        Ok(match base_fee {
            Some(_) => FeeParams::Dynamic {
                max_fee_per_gas: gas_price.saturating_mul(2),
                max_priority_fee_per_gas: gas_price,
            },
            None => FeeParams::Legacy { gas_price },
        })
    }
}
