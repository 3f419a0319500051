//! Unspent output selection.
//!
//! Picks outputs that cover a target while keeping the input count low:
//! an exact single match wins outright, otherwise the largest outputs are
//! taken until one remaining output alone covers what is left.

use crate::amount::SatoshiAmount;
use crate::error::CoreError;
use crate::types::SpendableOutput;

/// Select outputs whose total covers `target`.
///
/// Returns an empty vector when `candidates` cannot cover `target`; that is
/// the insufficient-funds answer, not an error. Fails with
/// [`CoreError::Validation`] when `target` is zero or below `min_spend`.
///
/// The result is ordered by the step that chose each output. Every output
/// except the last one was taken because nothing smaller covered the
/// remainder, so dropping the last output always leaves the total short.
pub fn select_outputs_for_spend(
    candidates: &[SpendableOutput],
    target: SatoshiAmount,
    min_spend: SatoshiAmount,
) -> Result<Vec<SpendableOutput>, CoreError> {
    if target.is_zero() {
        return Err(CoreError::Validation("spend amount must be positive".into()));
    }
    if target < min_spend {
        return Err(CoreError::Validation(format!(
            "spend amount {} sat is below the minimum of {} sat",
            target.to_sat(),
            min_spend.to_sat()
        )));
    }

    let mut total = SatoshiAmount::ZERO;
    for output in candidates {
        if output.value == target {
            return Ok(vec![output.clone()]);
        }
        total += output.value;
    }
    if total < target {
        return Ok(Vec::new());
    }

    let mut remaining: Vec<&SpendableOutput> = candidates.iter().collect();
    remaining.sort_by_key(|output| output.value);

    let mut selected = Vec::new();
    let mut residual = target;
    loop {
        let idx = remaining.partition_point(|output| output.value < residual);
        if let Some(output) = remaining.get(idx) {
            selected.push((*output).clone());
            return Ok(selected);
        }
        // Nothing covers the residual on its own; take the largest.
        let Some(largest) = remaining.pop() else {
            // Unreachable: the total was checked above.
            return Ok(Vec::new());
        };
        residual = residual.saturating_sub(largest.value);
        selected.push(largest.clone());
    }
}
