//! Fee and change convergence.
//!
//! Fees depend on how many inputs are selected, and the selection depends
//! on how much fee has to be covered. [`converge_fee`] re-runs the coin
//! selector with a growing target until the selected inputs pay for the
//! payments, their own fee, and either no change or change above dust.

use serde::Serialize;

use crate::amount::SatoshiAmount;
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::selection::select_outputs_for_spend;
use crate::types::SpendableOutput;

// ==============================================================================
// Size and Fee Estimation
// ==============================================================================

/// Approximate serialized size of a signed P2PKH input.
pub const INPUT_SIZE_BYTES: u64 = 181;
pub const OUTPUT_SIZE_BYTES: u64 = 34;
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Linear size heuristic; not byte-exact.
#[must_use]
pub fn estimate_tx_size(inputs: usize, outputs: usize) -> u64 {
    INPUT_SIZE_BYTES * inputs as u64 + OUTPUT_SIZE_BYTES * outputs as u64 + TX_OVERHEAD_BYTES
}

/// Fee for the estimated size at `fee_rate` sat per 1024 bytes, rounded up.
///
/// A fee rate so large that the product overflows `u64` is a validation
/// error.
pub fn estimate_fee(
    inputs: usize,
    outputs: usize,
    fee_rate: SatoshiAmount,
) -> Result<SatoshiAmount, CoreError> {
    let size = estimate_tx_size(inputs, outputs);
    size
        .checked_mul(fee_rate.to_sat())
        .map(|weighted| SatoshiAmount::from_sat(weighted.div_ceil(1024)))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "fee rate of {} sat/KB overflows for a {size} byte transaction",
                fee_rate.to_sat()
            ))
        })
}

fn add_amounts(left: SatoshiAmount, right: SatoshiAmount) -> Result<SatoshiAmount, CoreError> {
    left.checked_add(right).ok_or_else(|| {
        CoreError::Validation(format!(
            "{} sat plus {} sat overflows",
            left.to_sat(),
            right.to_sat()
        ))
    })
}

// ==============================================================================
// Convergence Loop
// ==============================================================================

/// One payee of a spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub address: String,
    pub amount: SatoshiAmount,
}

impl Payment {
    pub fn new(address: impl Into<String>, amount: SatoshiAmount) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub fee_rate: SatoshiAmount,
    pub dust_threshold: SatoshiAmount,
    pub min_spend: SatoshiAmount,
}

impl From<&BridgeConfig> for FeeParams {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            fee_rate: config.fee_rate,
            dust_threshold: config.dust_threshold,
            min_spend: config.min_spend,
        }
    }
}

/// Inputs, outputs and fee of a spend that balances exactly:
/// `sum(inputs) == sum(payments) + fee + change`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeePlan {
    pub inputs: Vec<SpendableOutput>,
    /// Payments as they will be sent. The last one may be lower than
    /// requested, see `amount_reduced_by`.
    pub payments: Vec<Payment>,
    pub fee: SatoshiAmount,
    /// Zero means no change output.
    pub change: SatoshiAmount,
    /// How much was taken off the last payment so that change reaches the
    /// dust threshold instead of being burnt as fee.
    pub amount_reduced_by: SatoshiAmount,
    pub iterations: usize,
}

impl FeePlan {
    pub fn has_change(&self) -> bool {
        !self.change.is_zero()
    }

    pub fn input_total(&self) -> SatoshiAmount {
        self.inputs.iter().map(|o| o.value).sum()
    }
}

/// Find inputs and a fee that fund `payments` out of `available`.
///
/// `Ok(None)` means the outputs cannot cover the payments plus fee.
pub fn converge_fee(
    available: &[SpendableOutput],
    payments: &[Payment],
    params: &FeeParams,
) -> Result<Option<FeePlan>, CoreError> {
    validate_payments(payments, params.min_spend)?;

    let mut payments = payments.to_vec();
    let mut amount = total_payments(&payments)?;
    // Payees plus one change output; the fee always budgets for change.
    let outputs = payments.len() + 1;
    let mut required = add_amounts(amount, estimate_fee(1, outputs, params.fee_rate)?)?;
    let mut iterations = 0;

    loop {
        iterations += 1;
        let inputs = select_outputs_for_spend(available, required, params.min_spend)?;
        if inputs.is_empty() {
            tracing::debug!(
                required = required.to_sat(),
                iterations,
                "insufficient funds for spend"
            );
            return Ok(None);
        }

        let fee = estimate_fee(inputs.len(), outputs, params.fee_rate)?;
        let total = SatoshiAmount::checked_sum(inputs.iter().map(|o| o.value)).ok_or_else(|| {
            CoreError::InvalidResponse("selected outputs overflow a u64 total".into())
        })?;
        tracing::trace!(
            iterations,
            inputs = inputs.len(),
            total = total.to_sat(),
            fee = fee.to_sat(),
            "fee convergence step"
        );

        let spent = add_amounts(amount, fee)?;
        let Some(change) = total.checked_sub(spent) else {
            // The extra inputs cost more fee than they brought in.
            required = spent;
            continue;
        };

        let mut amount_reduced_by = SatoshiAmount::ZERO;
        let change = if change.is_zero() || change >= params.dust_threshold {
            change
        } else {
            let shortfall = params.dust_threshold.saturating_sub(change);
            let last = payments
                .last_mut()
                .ok_or_else(|| CoreError::Validation("no payments to fund".into()))?;
            let reduced = last
                .amount
                .checked_sub(shortfall)
                .filter(|reduced| *reduced >= params.min_spend)
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "amount too small after fee: {} sat to {} cannot give up {} sat for change",
                        last.amount.to_sat(),
                        last.address,
                        shortfall.to_sat()
                    ))
                })?;
            tracing::warn!(
                address = %last.address,
                requested = last.amount.to_sat(),
                sent = reduced.to_sat(),
                "payment reduced to lift change above dust"
            );
            last.amount = reduced;
            amount = amount.saturating_sub(shortfall);
            amount_reduced_by = shortfall;
            params.dust_threshold
        };

        return Ok(Some(FeePlan {
            inputs,
            payments,
            fee,
            change,
            amount_reduced_by,
            iterations,
        }));
    }
}

pub(crate) fn validate_payments(payments: &[Payment], min_spend: SatoshiAmount) -> Result<(), CoreError> {
    if payments.is_empty() {
        return Err(CoreError::Validation("at least one payment is required".into()));
    }
    for payment in payments {
        if payment.address.trim().is_empty() {
            return Err(CoreError::Validation("payment address must not be empty".into()));
        }
        if payment.amount.is_zero() {
            return Err(CoreError::Validation(format!(
                "payment to {} must be positive",
                payment.address
            )));
        }
        if !payment.amount.is_money_range() {
            return Err(CoreError::Validation(format!(
                "payment of {} sat to {} exceeds the 21M BTC supply",
                payment.amount.to_sat(),
                payment.address
            )));
        }
        if payment.amount < min_spend {
            return Err(CoreError::Validation(format!(
                "payment of {} sat to {} is below the minimum of {} sat",
                payment.amount.to_sat(),
                payment.address,
                min_spend.to_sat()
            )));
        }
    }
    Ok(())
}

/// Sum of all payments, which must itself stay within the coin supply.
fn total_payments(payments: &[Payment]) -> Result<SatoshiAmount, CoreError> {
    SatoshiAmount::checked_sum(payments.iter().map(|p| p.amount))
        .filter(|total| total.is_money_range())
        .ok_or_else(|| {
            CoreError::Validation("payments add up to more than the 21M BTC supply".into())
        })
}
